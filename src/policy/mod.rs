mod standard;

pub use standard::StandardPolicy;
