#![no_main]

use canrisk::{Settings, output};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let settings = Settings::default();
    if let Ok(parsed) = output::parse(&text, &settings.bc.genes)
        && let Some(probabilities) = parsed.mutation_probabilities
    {
        assert_eq!(probabilities.len(), settings.bc.genes.len() + 1);
    }
});
