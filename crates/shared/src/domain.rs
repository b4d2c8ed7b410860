use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(NoteId);
id_newtype!(ParagraphId);
id_newtype!(BindingId);

/// Execution status reported by the backend. Only `Pending` and `Running`
/// carry meaning for the client; everything else is passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParagraphStatus {
    #[default]
    Ready,
    Pending,
    Running,
    Finished,
    Error,
    Abort,
    #[serde(other)]
    Unknown,
}

impl ParagraphStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookAndFeel {
    #[default]
    Default,
    Simple,
    Report,
}

impl LookAndFeel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Simple => "simple",
            Self::Report => "report",
        }
    }

    /// Report mode renders the note read-only.
    pub fn is_view_only(self) -> bool {
        self == Self::Report
    }
}

impl fmt::Display for LookAndFeel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
