pub mod source_resolver;
pub mod template_enumerator;

pub use source_resolver::{SourceMatch, SourceResolver, DATE_FORMAT};
pub use template_enumerator::{TemplateDescriptor, TemplateEnumerator};
