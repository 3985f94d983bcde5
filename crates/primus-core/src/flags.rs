//! Launch flags interpreted by the coordination core.
//!
//! Only a handful of arguments mean anything to the core. Everything else is
//! opaque payload forwarded verbatim to the primary instance, so this is a
//! tolerant scan rather than a full command-line parser: unknown arguments are
//! skipped and a malformed `--server-port` is ignored with a warning.

use tracing::warn;

pub const REPLACE: &str = "--replace";
pub const REPLACE_SHORT: &str = "-r";
pub const ABORT: &str = "--abort";
pub const ABORT_SHORT: &str = "-q";
pub const NO_SERVER: &str = "--no-server";
pub const SERVER_HOST: &str = "--server-host";
pub const SERVER_PORT: &str = "--server-port";

/// Flags found in a launch's argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    /// Take over from the current holder of this identity.
    pub replace: bool,
    /// Terminate the current holder and do not start.
    pub abort: bool,
    /// Skip coordination and run standalone.
    pub no_server: bool,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
}

impl LaunchFlags {
    /// Scan `arguments` for the flags the core understands.
    ///
    /// Accepts both `--server-port 1234` and `--server-port=1234`.
    pub fn parse<S: AsRef<str>>(arguments: &[S]) -> Self {
        let mut flags = LaunchFlags::default();
        let mut iter = arguments.iter().map(AsRef::<str>::as_ref);

        while let Some(arg) = iter.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) if name.starts_with("--") => (name, Some(value)),
                _ => (arg, None),
            };

            match name {
                REPLACE | REPLACE_SHORT => flags.replace = true,
                ABORT | ABORT_SHORT => flags.abort = true,
                NO_SERVER => flags.no_server = true,
                SERVER_HOST => {
                    let value = inline.or_else(|| iter.next());
                    match value {
                        Some(host) if !host.is_empty() => {
                            flags.server_host = Some(host.to_string())
                        }
                        _ => warn!("Ignoring {} without a value", SERVER_HOST),
                    }
                }
                SERVER_PORT => {
                    let value = inline.or_else(|| iter.next());
                    match value.map(str::parse::<u16>) {
                        Some(Ok(port)) => flags.server_port = Some(port),
                        Some(Err(e)) => warn!("Ignoring invalid {}: {}", SERVER_PORT, e),
                        None => warn!("Ignoring {} without a value", SERVER_PORT),
                    }
                }
                _ => {}
            }
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let flags = LaunchFlags::parse::<&str>(&[]);
        assert_eq!(flags, LaunchFlags::default());
    }

    #[test]
    fn test_parse_short_and_long_forms() {
        let flags = LaunchFlags::parse(&["-r", "file.txt"]);
        assert!(flags.replace);
        assert!(!flags.abort);

        let flags = LaunchFlags::parse(&["--abort"]);
        assert!(flags.abort);

        let flags = LaunchFlags::parse(&["-q", "--no-server"]);
        assert!(flags.abort);
        assert!(flags.no_server);
        assert!(!flags.replace);
    }

    #[test]
    fn test_parse_host_and_port() {
        let flags = LaunchFlags::parse(&[
            "--server-host",
            "10.0.0.2",
            "notes.md",
            "--server-port=5000",
        ]);
        assert_eq!(flags.server_host.as_deref(), Some("10.0.0.2"));
        assert_eq!(flags.server_port, Some(5000));
    }

    #[test]
    fn test_parse_invalid_port_is_ignored() {
        let flags = LaunchFlags::parse(&["--server-port", "not-a-port", "--replace"]);
        assert_eq!(flags.server_port, None);
        assert!(flags.replace);
    }

    #[test]
    fn test_opaque_arguments_do_not_set_flags() {
        let flags = LaunchFlags::parse(&["--replacement", "-rq", "abort"]);
        assert!(!flags.replace);
        assert!(!flags.abort);
    }
}
