//! Library-level tests for the CLI: project setup, config discovery and
//! running trees read from disk.

use std::path::PathBuf;

use plinth_cli::config::{PlinthConfig, CONFIG_FILE};
use plinth_cli::error::CliError;
use plinth_cli::{init, load_tree, run_tree, sample_tree, SAMPLE_TREE_FILE};
use plinth_core::ast::{Expr, FunctionLiteral, Stmt};
use plinth_vm::VmError;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("plinth-cli-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn init_writes_a_runnable_project() {
    let dir = scratch_dir("init");
    let created = init(&dir, false).unwrap();
    assert_eq!(created, vec![dir.join(CONFIG_FILE), dir.join(SAMPLE_TREE_FILE)]);

    let tree = load_tree(&dir.join(SAMPLE_TREE_FILE)).unwrap();
    assert_eq!(tree, sample_tree());
    let config = PlinthConfig::load_from(&dir.join(CONFIG_FILE)).unwrap();
    let report = run_tree(&tree, &config).unwrap();
    assert_eq!(report.output, ["total 285"]);

    let again = init(&dir, false).unwrap_err();
    assert!(matches!(again, CliError::Exists(_)), "{again}");
    assert!(init(&dir, true).is_ok());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn config_is_found_in_an_ancestor() {
    let root = scratch_dir("ancestor");
    let nested = root.join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(root.join(CONFIG_FILE), "[compile]\nstrict_unsupported = true\n").unwrap();

    let found = PlinthConfig::find_from(&nested).unwrap();
    assert_eq!(found, root.join(CONFIG_FILE));
    let config = PlinthConfig::load_from(&found).unwrap();
    assert!(config.compile.strict_unsupported);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn malformed_inputs_name_the_file() {
    let dir = scratch_dir("malformed");
    let tree_path = dir.join("broken.json");
    std::fs::write(&tree_path, "{\"name\": 3}").unwrap();
    let err = load_tree(&tree_path).unwrap_err();
    assert!(matches!(err, CliError::Json { .. }));
    assert!(err.to_string().contains("broken.json"), "{err}");

    let config_path = dir.join(CONFIG_FILE);
    std::fs::write(&config_path, "[vm]\nmax_steps = \"many\"\n").unwrap();
    let err = PlinthConfig::load_from(&config_path).unwrap_err();
    assert!(matches!(err, CliError::Toml { .. }));

    let missing = load_tree(&dir.join("absent.json")).unwrap_err();
    assert!(matches!(missing, CliError::Read { .. }));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn step_limit_comes_from_the_config() {
    let spin = FunctionLiteral::new("main").with_body(vec![Stmt::while_loop(
        0,
        Expr::boolean(true),
        Stmt::Empty,
    )]);
    let mut config = PlinthConfig::default();
    config.vm.max_steps = 5_000;
    let err = run_tree(&spin, &config).unwrap_err();
    assert!(matches!(err, CliError::Vm(VmError::StepLimit(5_000))), "{err}");
}
