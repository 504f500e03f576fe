//! Best-effort separation of incrbuild options from sphinx-build arguments
//!
//! The split never fails: anything that is not one of our own long options
//! is passed through untouched, in its original order.

/// A long option consumed by incrbuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnOption {
    /// Option name without the leading dashes
    pub long: String,
    /// Whether the option consumes a value
    pub takes_value: bool,
}

/// Arguments after the split
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    /// Tokens belonging to incrbuild options (with their values)
    pub known: Vec<String>,
    /// Tokens forwarded to the build engine
    pub passthrough: Vec<String>,
}

/// Split `args` (without the program name) into own and foreign tokens
pub fn split_known(args: &[String], own: &[OwnOption]) -> Split {
    let mut split = Split::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            split.passthrough.push(arg.clone());
            split.passthrough.extend(iter.by_ref().cloned());
            break;
        }

        let Some(body) = arg.strip_prefix("--") else {
            split.passthrough.push(arg.clone());
            continue;
        };
        let (name, inline_value) = match body.split_once('=') {
            Some((name, _)) => (name, true),
            None => (body, false),
        };

        match own.iter().find(|opt| opt.long == name) {
            Some(opt) => {
                split.known.push(arg.clone());
                if opt.takes_value && !inline_value {
                    if let Some(value) = iter.next() {
                        split.known.push(value.clone());
                    }
                }
            }
            None => split.passthrough.push(arg.clone()),
        }
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own() -> Vec<OwnOption> {
        vec![
            OwnOption {
                long: "cache".to_string(),
                takes_value: true,
            },
            OwnOption {
                long: "dry".to_string(),
                takes_value: false,
            },
        ]
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn separate_value() {
        let split = split_known(&args(&["-b", "html", "--cache", "/c", "src", "out"]), &own());
        assert_eq!(split.known, args(&["--cache", "/c"]));
        assert_eq!(split.passthrough, args(&["-b", "html", "src", "out"]));
    }

    #[test]
    fn inline_value_and_flag() {
        let split = split_known(&args(&["--cache=/c", "--dry", "src", "out"]), &own());
        assert_eq!(split.known, args(&["--cache=/c", "--dry"]));
        assert_eq!(split.passthrough, args(&["src", "out"]));
    }

    #[test]
    fn unknown_and_prefix_options_pass_through() {
        let split = split_known(
            &args(&["--cache-dir", "x", "--keep-going", "-c", "conf", "src", "out"]),
            &own(),
        );
        assert!(split.known.is_empty());
        assert_eq!(
            split.passthrough,
            args(&["--cache-dir", "x", "--keep-going", "-c", "conf", "src", "out"])
        );
    }

    #[test]
    fn everything_after_double_dash_passes_through() {
        let split = split_known(&args(&["src", "out", "--", "--cache", "/c"]), &own());
        assert!(split.known.is_empty());
        assert_eq!(split.passthrough, args(&["src", "out", "--", "--cache", "/c"]));
    }

    #[test]
    fn trailing_option_without_value() {
        let split = split_known(&args(&["src", "out", "--cache"]), &own());
        assert_eq!(split.known, args(&["--cache"]));
        assert_eq!(split.passthrough, args(&["src", "out"]));
    }
}
