//! Build script for the camserve ESP32 firmware.
//!
//! Exports the ESP-IDF environment so esp-idf-sys can find the toolchain and
//! generate the camera bindings.

fn main() {
    embuild::espidf::sysenv::output();
}
