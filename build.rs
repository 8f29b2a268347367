fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // ESP-IDF builds export the toolchain environment; host builds need nothing.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
