pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The script threw and nothing caught it. Carries the exception message.
    #[error("{0}")]
    ScriptException(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_script_exception(&self) -> bool {
        matches!(self, EngineError::ScriptException(_))
    }
}

/// Errors raised from native callbacks back into JavaScript
#[derive(Debug, thiserror::Error)]
pub(crate) enum HostError {
    #[error("{0}")]
    Thrown(String),

    #[error("failed to run script: {0}")]
    RunScript(String),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("host state is not installed")]
    MissingState,
}

macro_rules! impl_js_error_class {
    ($error_type:ty) => {
        impl deno_error::JsErrorClass for $error_type {
            fn get_class(&self) -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Borrowed("Error")
            }

            fn get_message(&self) -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Owned(self.to_string())
            }

            fn get_additional_properties(
                &self,
            ) -> Box<
                dyn Iterator<Item = (std::borrow::Cow<'static, str>, deno_error::PropertyValue)>
                    + 'static,
            > {
                Box::new(std::iter::empty())
            }

            fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
                self
            }
        }
    };
}

impl_js_error_class!(HostError);
