mod registrar;
pub use registrar::*;

#[cfg(test)]
mod registrar_test;
