pub mod path_processing;
pub mod path_template;
pub mod redaction;

pub use path_processing::expand_tilde;
pub use path_template::{PathTemplate, TemplateError, UnresolvedPlaceholderError, placeholder_names};
pub use redaction::{redact_secrets, redact_secrets_with};
