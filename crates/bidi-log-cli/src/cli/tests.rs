#[cfg(test)]
mod tests {
    use crate::cli::{CategoryArg, Cli, Command};
    use bidi_log::{Category, Filter, LogLevel};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_replay_defaults() {
        let cli = Cli::parse_from(["bidi-log", "replay", "session.jsonl"]);
        match cli.command {
            Command::Replay(args) => {
                assert_eq!(args.file, PathBuf::from("session.jsonl"));
                assert_eq!(args.timeout_ms, 5000);
                assert_eq!(args.filter.category, CategoryArg::Any);
                assert!(!args.filter.json);
                assert!(args.filter.filters().is_empty());
            }
            Command::Tail(_) => panic!("expected replay"),
        }
    }

    #[test]
    fn test_tail_with_all_flags() {
        let cli = Cli::parse_from([
            "bidi-log",
            "--verbose",
            "tail",
            "--url",
            "ws://127.0.0.1:9222/session",
            "--category",
            "exception",
            "--level",
            "error",
            "--contains",
            "Not working",
            "--json",
            "--record",
            "out.jsonl",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Tail(args) => {
                assert_eq!(args.url.as_deref(), Some("ws://127.0.0.1:9222/session"));
                assert_eq!(args.record, Some(PathBuf::from("out.jsonl")));
                assert_eq!(Category::from(args.filter.category), Category::JavascriptException);
                assert!(args.filter.json);
                assert_eq!(
                    args.filter.filters(),
                    vec![
                        Filter::LevelEquals(LogLevel::Error),
                        Filter::TextContains("Not working".into())
                    ]
                );
            }
            Command::Replay(_) => panic!("expected tail"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["bidi-log", "-v", "-q", "replay", "x.jsonl"]).is_err());
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(Cli::try_parse_from(["bidi-log", "replay", "x.jsonl", "--category", "network"]).is_err());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(Category::from(CategoryArg::Console), Category::Console);
        assert_eq!(Category::from(CategoryArg::Javascript), Category::JavascriptLog);
        assert_eq!(Category::from(CategoryArg::Any), Category::Any);
    }
}
