fn main() {
    // ESP-IDF environment propagation; host builds (tests) skip it.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
