pub mod advection;
pub mod assembly;
pub mod stencil;
