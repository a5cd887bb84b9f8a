use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid grid size: {0}")]
    InvalidGridSize(String),

    #[error("Invalid node coordinates: {0}")]
    InvalidNodes(String),
}

#[derive(Error, Debug, Clone)]
pub enum BoundaryError {
    #[error("Invalid boundary condition for {0}")]
    InvalidBoundaryCondition(String),

    #[error("Boundary value shape {found:?} does not match {expected:?} on side {side}")]
    InvalidShape {
        side: String,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Boundary condition error: {0}")]
    BoundaryConditionError(#[from] BoundaryError),

    #[error(
        "Linear solver for {name} did not converge: {iterations} iterations, \
         relative residual {relative_residual:.3e}"
    )]
    NotConverged {
        name: String,
        iterations: usize,
        relative_residual: f64,
    },

    #[error("Linear solver failed: {0}")]
    LinearSolver(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}
