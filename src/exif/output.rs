use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Result of a metadata read or write.
///
/// ExifTool-level failures (non-zero exit, warnings on stderr, no output) are
/// reported here rather than as `Err`, so callers can show the message.
#[derive(Debug, Clone, PartialEq)]
pub enum ExifToolOutput<T> {
    /// The operation succeeded. The exit code is always 0.
    Success { data: T },
    Failure {
        /// Why the operation failed.
        error: String,
        /// The interpreter's exit code, `None` if it never produced one.
        exit_code: Option<i32>,
    },
}

impl<T> ExifToolOutput<T> {
    pub(crate) fn failure(error: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Failure { error: error.into(), exit_code }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Success { .. } => Some(0),
            Self::Failure { exit_code, .. } => *exit_code,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExifToolOutput<U> {
        match self {
            Self::Success { data } => ExifToolOutput::Success { data: f(data) },
            Self::Failure { error, exit_code } => ExifToolOutput::Failure { error, exit_code },
        }
    }

    /// Convert a failure into an `anyhow` error.
    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Failure { error, exit_code: Some(code) } => {
                anyhow::bail!("ExifTool failed (exit code {code}): {}", error.trim_end())
            }
            Self::Failure { error, exit_code: None } => {
                anyhow::bail!("ExifTool failed: {}", error.trim_end())
            }
        }
    }
}

impl<T: Serialize> Serialize for ExifToolOutput<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExifToolOutput", 3)?;
        match self {
            Self::Success { data } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
                state.serialize_field("exitCode", &0)?;
            }
            Self::Failure { error, exit_code } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
                state.serialize_field("exitCode", exit_code)?;
            }
        }
        state.end()
    }
}
