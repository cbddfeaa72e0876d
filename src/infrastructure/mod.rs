pub mod model;
pub mod navigation_url;
