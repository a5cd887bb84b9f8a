pub mod bc3d;
pub mod update;
