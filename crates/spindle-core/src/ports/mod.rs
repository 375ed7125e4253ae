//! Ports - 抽象化レイヤー
//!
//! ControllableTask が外部に依存するのはイベントの送り先だけなので、
//! ポートは EventSink のみです。

pub mod event_sink;

pub use self::event_sink::{ChannelEventSink, EventSink, NoopEventSink, TracingEventSink};
