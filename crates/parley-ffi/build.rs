fn main() {
    uniffi::generate_scaffolding("src/parley.udl").unwrap();
}
