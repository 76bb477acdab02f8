#![no_main]

use canrisk::{Model, Settings, pedigree_file, validate::validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Parse errors are expected for random input; panics are not
    let Ok(mut file) = pedigree_file::parse(text) else {
        return;
    };
    let _ = pedigree_file::write_boadicea_v4(&file.pedigrees);
    let settings = Settings::default();
    for model in [Model::Bc, Model::Oc, Model::Pc] {
        let _ = validate(&mut file.pedigrees, model, &settings, 2024);
    }
});
