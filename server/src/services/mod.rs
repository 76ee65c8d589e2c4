//! Service layer: room fabric, fan-out, chat, persistence and upload
//! ports, credentials, and the event router.

pub mod auth;
pub mod chat;
pub mod fanout;
pub mod image;
pub mod room;
pub mod router;
pub mod storage;
pub mod timelapse;
