mod emitter;
mod register;

pub use emitter::Emitter;
pub use register::Register;
