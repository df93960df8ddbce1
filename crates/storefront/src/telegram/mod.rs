//! Telegram integration: Mini App identity and the Bot API.

pub mod bot;
pub mod init_data;

pub use bot::{OpenAppButton, TelegramBotClient, TelegramError, escape_html};
pub use init_data::{
    InitDataError, InitDataVerifier, WebAppInitData, WebAppUser, sign_init_data, verify_init_data,
};
