// Domain layer: core models and ports (interfaces) for the appraisal session.

pub mod model;
pub mod ports;
