pub mod gpu;
pub mod hardpoly;
