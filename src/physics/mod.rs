pub mod bearing;
pub mod los;
pub mod refraction;
