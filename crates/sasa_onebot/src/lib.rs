pub mod cq;
pub mod event;

pub use event::{
    ApiAction, ApiParams, EchoResponse, MessageEvent, OneBotEvent, RawEvent, Sender,
};
