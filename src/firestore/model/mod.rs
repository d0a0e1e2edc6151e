mod document_key;
mod geo_point;
mod resource_path;
mod timestamp;

pub use document_key::DocumentKey;
pub use geo_point::GeoPoint;
pub use resource_path::ResourcePath;
pub use timestamp::Timestamp;
