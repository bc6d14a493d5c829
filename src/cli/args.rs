//! Flow parameters from the command line

use crate::config::Params;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("missing value for '--{key}'")]
    MissingValue { key: String },

    #[error("unexpected argument '{arg}', flow parameters look like --key value")]
    UnexpectedArgument { arg: String },
}

/// `Some(key)` when `arg` is an option name such as `--key`, `-key` or
/// `--key=value` (the `=value` part is left in the key).
///
/// Negative numbers like `-1` are values, not options.
fn option_name(arg: &str) -> Option<&str> {
    let name = arg.trim_start_matches('-');
    if name.len() == arg.len() || name.is_empty() {
        return None;
    }
    name.starts_with(|c: char| c.is_alphabetic() || c == '_')
        .then_some(name)
}

/// Parse `--key value`, `--key=value` and `-key value` pairs.
///
/// Values stay strings; flows coerce them with the typed accessors. A later
/// occurrence of a key replaces an earlier one.
pub fn parse_flow_args(args: &[String]) -> Result<Params, CliError> {
    let mut params = Params::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        let Some(name) = option_name(arg) else {
            return Err(CliError::UnexpectedArgument { arg: arg.clone() });
        };

        if let Some((key, value)) = name.split_once('=') {
            params.insert(key.to_string(), Value::String(value.to_string()));
            continue;
        }

        match iter.next_if(|next| option_name(next).is_none()) {
            Some(value) => {
                params.insert(name.to_string(), Value::String(value.clone()));
            }
            None => {
                return Err(CliError::MissingValue {
                    key: name.to_string(),
                });
            }
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_pairs() {
        let params = parse_flow_args(&args(&[
            "--cmd",
            "echo hi",
            "--wait=false",
            "-repository_path",
            "~/src",
        ]))
        .unwrap();

        assert_eq!(params["cmd"], json!("echo hi"));
        assert_eq!(params["wait"], json!("false"));
        assert_eq!(params["repository_path"], json!("~/src"));
    }

    #[test]
    fn test_negative_number_is_value() {
        let params = parse_flow_args(&args(&["--max_trigger_count", "-1"])).unwrap();
        assert_eq!(params["max_trigger_count"], json!("-1"));
    }

    #[test]
    fn test_equals_keeps_rest_of_value() {
        let params = parse_flow_args(&args(&["--url=https://x/?a=b"])).unwrap();
        assert_eq!(params["url"], json!("https://x/?a=b"));
    }

    #[test]
    fn test_later_key_wins() {
        let params = parse_flow_args(&args(&["--msg", "one", "--msg", "two"])).unwrap();
        assert_eq!(params["msg"], json!("two"));
    }

    #[test]
    fn test_dangling_key() {
        assert_eq!(
            parse_flow_args(&args(&["--msg", "hi", "--wait"])),
            Err(CliError::MissingValue { key: "wait".into() })
        );
        assert_eq!(
            parse_flow_args(&args(&["--cmd", "--wait", "true"])),
            Err(CliError::MissingValue { key: "cmd".into() })
        );
    }

    #[test]
    fn test_positional_rejected() {
        assert_eq!(
            parse_flow_args(&args(&["stray"])),
            Err(CliError::UnexpectedArgument { arg: "stray".into() })
        );
    }
}
