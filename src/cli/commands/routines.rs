//! Routines command: list everything the registry knows about

use anyhow::Result;
use clap::Args;

use crate::routines::RoutineRegistry;

#[derive(Args, Default)]
pub struct RoutinesArgs {}

pub fn execute(_args: RoutinesArgs) -> Result<()> {
    let registry = RoutineRegistry::builtin();
    for routine in registry.routines() {
        let extensions = match routine.extensions() {
            Some(extensions) => format!(" ({})", extensions.join(", ")),
            None => String::new(),
        };
        println!("{:<22} {}{}", routine.name(), routine.description(), extensions);
    }
    Ok(())
}
