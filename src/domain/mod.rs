// Domain layer: sample/attempt models and the encoder port the search runs against.

pub mod model;
pub mod ports;
