/*!
# Saving Chains to CSV

Writes the stored chain of a [`FitResult`] as a CSV file. Enable via the `csv` feature.
*/

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::error::{FitError, Result};
use crate::fit_result::FitResult;

/**
Saves the post burn-in chain of `result` as a CSV file.

The file has a header row `sample`, one column per parameter (named after the
parameter) and `value`, the test statistic of that sample. Each following row
is one sample.

Fails with [`FitError::NotConfigured`] if the run did not keep its chain.
*/
pub fn save_chain_csv<P: AsRef<Path>>(result: &FitResult, path: P) -> Result<()> {
    let chain = result
        .chain
        .as_ref()
        .ok_or_else(|| FitError::NotConfigured("the chain was not saved".into()))?;
    let mut wtr = Writer::from_writer(File::create(path)?);

    let mut header: Vec<String> = vec!["sample".to_string()];
    header.extend(result.parameter_names.iter().cloned());
    header.push("value".to_string());
    wtr.write_record(&header)?;

    for (i, sample) in chain.rows().into_iter().enumerate() {
        let mut row = vec![i.to_string()];
        row.extend(sample.iter().map(|v| v.to_string()));
        let value = result
            .chain_values
            .as_ref()
            .and_then(|v| v.get(i))
            .copied()
            .unwrap_or(f64::NAN);
        row.push(value.to_string());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
