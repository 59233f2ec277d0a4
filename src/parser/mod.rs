pub mod normalize;
pub mod types;
pub mod validate;

pub use normalize::{normalize_fields, NormalizedRow, Normalizer};
pub use types::{Action, StepFields, StepForm, StepKind};
pub use validate::{preview, validate_fields, validate_form, Diagnostic, ImportSummary};
