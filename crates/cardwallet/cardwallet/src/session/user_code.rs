use std::fmt;

use crate::environment::UserCodeType;

type Prompt = Box<dyn Fn(UserCodeType) -> Option<String> + Send + Sync>;

/// Source of a user code the session asks for when it holds none
pub enum UserCodeProvider {
    /// A fixed code
    Code(String),
    /// Asks the user; `None` cancels the command
    Callback(Prompt),
}

impl UserCodeProvider {
    /// Provider calling `prompt` each time a code is needed
    pub fn callback<F>(prompt: F) -> Self
    where
        F: Fn(UserCodeType) -> Option<String> + Send + Sync + 'static,
    {
        Self::Callback(Box::new(prompt))
    }

    pub(crate) fn request(&self, kind: UserCodeType) -> Option<String> {
        match self {
            Self::Code(code) => Some(code.clone()),
            Self::Callback(prompt) => prompt(kind),
        }
    }
}

impl fmt::Debug for UserCodeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(_) => f.write_str("Code(..)"),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<&str> for UserCodeProvider {
    fn from(code: &str) -> Self {
        Self::Code(code.to_owned())
    }
}

impl From<String> for UserCodeProvider {
    fn from(code: String) -> Self {
        Self::Code(code)
    }
}
