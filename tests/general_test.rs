use hocon_core::parser::Parser;
use miette::Report;
use std::fs;
use std::path::Path;

#[test]
fn test_all_conf_files_parse() {
    let tests_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("ok");
    let entries = fs::read_dir(&tests_dir).expect("Failed to read tests/ok directory");

    let mut parsed = 0;
    for entry in entries {
        let entry = entry.expect("Failed to read directory entry");
        let path = entry.path();

        if path.is_file() && path.extension().is_some_and(|ext| ext == "conf") {
            println!("Parsing file: {:?}", path);
            let source = fs::read_to_string(&path)
                .unwrap_or_else(|err| panic!("Failed to read file {:?}: {err}", path));

            let mut parser = Parser::new_with_name(&source, path.display().to_string())
                .unwrap_or_else(|err| panic!("Lexer failed on {:?}: {:?}", path, Report::new(err)));

            if let Err(err) = parser.parse_document() {
                panic!("Failed to parse {:?}. Error: {:#?}", path, Report::new(err));
            }
            parsed += 1;
        }
    }
    assert!(parsed > 0, "no fixtures found in {:?}", tests_dir);
}
