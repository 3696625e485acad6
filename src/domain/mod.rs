//! Domain model: venues, submitters, authority, merged views, scores,
//! flags, and the approval-time replacement model. Everything here is a
//! value type with identifier-based relationships; no module holds
//! back-pointers or I/O.

pub mod authority;
pub mod combined;
pub mod flags;
pub mod place;
pub mod replacement;
pub mod score;
pub mod spec;
pub mod submitter;
pub mod venue;

pub use authority::{assess, matches_region, AuthorityAssessment, AuthorityTier};
pub use combined::{CombinedInfo, FieldSource, SourcedField};
pub use flags::{QualityFlags, SpecialFlags};
pub use place::{AddressComponent, BusinessStatus, LatLng, PlaceRecord, Viewport};
pub use replacement::{build_replacement, ApprovalData, DataReplacement};
pub use score::{ModelBreakdown, ModelScore, ModelVerdict, Outcome, ScoreBreakdown, ValidationResult};
pub use spec::{critical_data_spec, AllOf, CriticalDataInput, Specification};
pub use submitter::Submitter;
pub use venue::{ApprovalStatus, EntryType, Venue};
