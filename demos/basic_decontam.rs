//! Basic example of contaminant identification.
//!
//! This example shows how to:
//! 1. Create synthetic data with extraction blanks
//! 2. Score features with each method
//! 3. Remove contaminants
//! 4. Summarize the score distribution

use decontam::prelude::*;
use sprs::TriMat;
use std::io::Write;

fn main() -> Result<()> {
    println!("=== decontam Example ===\n");

    let (counts, metadata) = create_example_data()?;
    println!("Data dimensions:");
    println!("  Features: {}", counts.n_features());
    println!("  Samples:  {}", counts.n_samples());
    println!();

    let registry = MethodRegistry::new();
    println!("{}", registry);

    for info in registry.methods() {
        let scores = Decontam::new()
            .method(info.method)
            .concentration_column("dna_conc")
            .control_column("sample_type")
            .control_indicator("blank")
            .identify(&counts, &metadata)?;

        let flagged: Vec<String> = classify(&scores, Threshold::default())
            .into_iter()
            .filter(|d| d.contaminant)
            .map(|d| d.feature_id)
            .collect();
        println!(
            "{:<10} scored {:>3} features, {:>2} contaminants: {:?}",
            info.method,
            scores.len(),
            flagged.len(),
            flagged
        );
    }
    println!();

    println!("=== Combined Run ===\n");
    let run = Decontam::new()
        .method(DeconMethod::Combined)
        .concentration_column("dna_conc")
        .control_column("sample_type")
        .control_indicator("blank")
        .threshold(0.1)
        .run(&counts, &metadata)?;

    println!("{}", run.summary);
    println!("{}", summarize(&run.scores, Threshold::default())?);

    println!("=== Parameters (YAML) ===\n");
    let params = Decontam::new()
        .method(DeconMethod::Combined)
        .concentration_column("dna_conc")
        .control_column("sample_type")
        .control_indicator("blank")
        .params()
        .to_yaml()?;
    println!("{}", params);

    Ok(())
}

/// Create example data: 4 blanks and 20 samples over a range of DNA
/// concentrations. Features 0-2 are reagent contaminants (abundance ∝ 1/conc),
/// features 3-4 appear mostly in blanks, the rest are community members.
fn create_example_data() -> Result<(CountMatrix, Metadata)> {
    let n_blanks = 4;
    let n_samples = 24;
    let n_features = 30;

    let mut seed = 12345u64;
    let rand_uniform = |s: &mut u64| -> f64 {
        *s = s.wrapping_mul(1103515245).wrapping_add(12345);
        ((*s >> 16) & 0x7FFF) as f64 / 32768.0
    };

    let concentrations: Vec<f64> = (0..n_samples)
        .map(|j| {
            if j < n_blanks {
                0.2
            } else {
                1.0 + 19.0 * rand_uniform(&mut seed)
            }
        })
        .collect();

    let mut tri_mat = TriMat::new((n_features, n_samples));
    for (sample, &conc) in concentrations.iter().enumerate() {
        let is_blank = sample < n_blanks;
        for feat in 0..n_features {
            let noise = 0.8 + 0.4 * rand_uniform(&mut seed);
            let count = match feat {
                0..=2 => 300.0 / conc * noise,
                3..=4 if is_blank => 80.0 * noise,
                3..=4 => {
                    if rand_uniform(&mut seed) < 0.1 {
                        5.0 * noise
                    } else {
                        0.0
                    }
                }
                _ if is_blank => 0.0,
                _ => {
                    if rand_uniform(&mut seed) < 0.8 {
                        (50.0 + 10.0 * feat as f64) * noise
                    } else {
                        0.0
                    }
                }
            };
            let count = count.round();
            if count > 0.0 {
                tri_mat.add_triplet(feat, sample, count);
            }
        }
    }

    let feature_ids: Vec<String> = (0..n_features)
        .map(|i| match i {
            0..=2 => format!("reagent_{}", i),
            3..=4 => format!("blank_{}", i - 3),
            _ => format!("asv_{}", i - 5),
        })
        .collect();
    let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("S{:02}", i)).collect();
    let counts = CountMatrix::new(tri_mat.to_csr(), feature_ids, sample_ids.clone())?;

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "sample-id\tsample_type\tdna_conc")?;
    for (i, id) in sample_ids.iter().enumerate() {
        let kind = if i < n_blanks { "blank" } else { "sample" };
        writeln!(file, "{}\t{}\t{:.3}", id, kind, concentrations[i])?;
    }
    file.flush()?;
    let metadata = Metadata::from_tsv(file.path())?;

    Ok((counts, metadata))
}
