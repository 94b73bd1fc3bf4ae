//! A bot declared against a future ABI.

use botlet::bot::{BotDeclaration, no_init};

#[unsafe(no_mangle)]
pub static BOTLET_BOT: BotDeclaration = BotDeclaration {
    abi_version: 999,
    init: no_init,
};
