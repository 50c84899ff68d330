// ==================== Environment Override Tests ====================
//
// Kept in its own test binary: loading a `.env` file changes the process
// environment.

use colpersist::{MappingConfig, CONFIG_FILE_NAME, ENV_PARAMETER_STYLE};
use colpersist_core::ParameterStyle;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_env_file_overrides_parameter_style() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "parameter_style = \"positional\"\n",
    )
    .unwrap();
    fs::write(
        dir.path().join(".env"),
        format!("{}=numbered\n", ENV_PARAMETER_STYLE),
    )
    .unwrap();

    let config = MappingConfig::load(dir.path()).unwrap();
    assert_eq!(config.parameter_style, ParameterStyle::Numbered);
    assert!(config.collections.is_empty());
}
