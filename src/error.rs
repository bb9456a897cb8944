/// Invalid combinations of flags and positional arguments.
///
/// These are all detected before any file or network access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    #[error("flag '--{flag}' is incompatible with '--{other}'")]
    Incompatible {
        flag: &'static str,
        other: &'static str,
    },

    #[error("'{command}' requires the '--{flag}' flag")]
    Required {
        command: &'static str,
        flag: &'static str,
    },

    #[error("flag '--{with}' requires the '--{flag}' flag")]
    RequiredWith {
        flag: &'static str,
        with: &'static str,
    },

    #[error("'{command}' requires the '--{flag}' flag unless '--{unless}' is provided")]
    RequiredUnless {
        command: &'static str,
        flag: &'static str,
        unless: &'static str,
    },

    #[error("'{command}' expects {expected} positional argument(s), got {got}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("'{command} --cert <certificate> --key <key>' expects no additional positional arguments")]
    UnexpectedArguments { command: &'static str },
}
