//! A shared library that is not a bot.

#[unsafe(no_mangle)]
pub extern "C" fn botlet_unrelated() -> u32 {
    7
}
