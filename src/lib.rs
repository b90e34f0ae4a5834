pub mod error;
pub mod settings;
pub mod template;

pub use error::TempletError;
pub use settings::RenderSettings;
pub use template::{Template, TemplateGroup, Value};
