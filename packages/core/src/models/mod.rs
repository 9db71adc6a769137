//! Data Models
//!
//! Plain data shared by every layer of the store:
//!
//! - `Location` - structured node address and the queries derived from it
//! - `RawRecord` - the datastore representation of a node
//! - `Scope` / `FieldRef` - which partition a field access targets

mod location;
mod record;
mod scope;

pub use location::{Location, LocationError, LocationQuery, DEFAULT_TAG, DRAFT_REVISION, LOCATION_FIELDS};
pub use record::{Definition, EditInfo, RawRecord};
pub use scope::{FieldRef, Scope};
