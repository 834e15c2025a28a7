// algorithm module
pub mod algorithm {
    pub mod baseline;
    pub mod binning;
    pub mod intensity;
    pub mod smoothing;
}

// data module
pub mod data {
    pub mod loader;
    pub mod spectrum;
}

pub mod error;
pub mod processing;

pub use data::spectrum::Spectrum;
pub use error::SpectrumError;
