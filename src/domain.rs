pub mod grid3d;
pub mod obstacle;
pub mod unknown;
pub mod velocity;
