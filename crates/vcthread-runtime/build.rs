//! Build script for vcthread-runtime
//!
//! Merges configuration defaults:
//! 1. Start with the library defaults below
//! 2. If `VCT_CONFIG_RS` names a file, read its `pub const` lines
//! 3. Known names from the user file override the defaults
//! 4. Write OUT_DIR/vct_merged_config.rs, included by `config::defaults`

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    // 0 = use the host processor count
    ConfigParam {
        name: "MAX_VCORES",
        rust_type: "usize",
        default_value: "0",
    },
    ConfigParam {
        name: "TRANSITION_STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "SIGNAL_STACK_SIZE",
        rust_type: "usize",
        default_value: "64 * 1024",
    },
    ConfigParam {
        name: "UTHREAD_STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "VCORE_THREAD_STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "PIN_CORES",
        rust_type: "bool",
        default_value: "true",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("vct_merged_config.rs");

    let mut config: HashMap<&str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("VCT_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);
        match fs::read_to_string(path) {
            Ok(content) => {
                parse_and_merge(&content, &mut config);
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read VCT_CONFIG_RS ({}): {}", path, e);
            }
        }
    }
    println!("cargo:rerun-if-env-changed=VCT_CONFIG_RS");

    let output = generate_config(&config, user_path.is_some());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Merge `pub const NAME: TYPE = VALUE;` lines for known parameters
fn parse_and_merge(content: &str, config: &mut HashMap<&str, String>) {
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };
        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => println!("cargo:warning=Unknown config parameter: {}", name),
        }
    }
}

/// Parse `pub const NAME: TYPE = VALUE;` into (NAME, VALUE)
fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();
    let colon = rest.find(':')?;
    let eq = rest.find('=')?;
    if eq < colon {
        return None;
    }
    let semi = rest.rfind(';').unwrap_or(rest.len());
    let name = rest[..colon].trim().to_string();
    let value = rest[eq + 1..semi].trim().to_string();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn generate_config(config: &HashMap<&str, String>, has_user_file: bool) -> String {
    let mut output = String::new();
    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if has_user_file {
        output.push_str(" and VCT_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = &config[param.name];
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_const_line() {
        assert_eq!(
            parse_const_line("pub const MAX_VCORES: usize = 8;"),
            Some(("MAX_VCORES".into(), "8".into()))
        );
        assert_eq!(
            parse_const_line("pub const SIGNAL_STACK_SIZE: usize = 128 * 1024;"),
            Some(("SIGNAL_STACK_SIZE".into(), "128 * 1024".into()))
        );
        assert_eq!(parse_const_line("const X: usize = 1;"), None);
    }

    #[test]
    fn test_parse_and_merge() {
        let mut config: HashMap<&str, String> = HashMap::new();
        config.insert("MAX_VCORES", "0".into());
        config.insert("PIN_CORES", "true".into());

        parse_and_merge(
            "// overrides\npub const MAX_VCORES: usize = 16;\npub const PIN_CORES: bool = false;\n",
            &mut config,
        );

        assert_eq!(config["MAX_VCORES"], "16");
        assert_eq!(config["PIN_CORES"], "false");
    }
}
