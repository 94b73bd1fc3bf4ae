//! A valid declaration without a `botlet_run_bot` entry point.

use botlet::bot::{BOTLET_ABI_VERSION, BotDeclaration, no_init};

#[unsafe(no_mangle)]
pub static BOTLET_BOT: BotDeclaration = BotDeclaration {
    abi_version: BOTLET_ABI_VERSION,
    init: no_init,
};
