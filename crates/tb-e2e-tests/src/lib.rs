//! Cross-crate scenario tests for the device client.
//!
//! The tests live in `tests/`; they wire `DeviceClient` and `Agent` to a
//! scripted ThingsBoard server played by `MockChannel`.
