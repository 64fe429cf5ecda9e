use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};

/// Open every input up front so a missing file fails before any work starts
pub fn open_inputs(files: &[String]) -> Result<Vec<Box<dyn BufRead>>> {
    if files.is_empty() {
        return Ok(vec![Box::new(BufReader::new(io::stdin()))]);
    }

    files
        .iter()
        .map(|path| -> Result<Box<dyn BufRead>> {
            if path == "-" {
                return Ok(Box::new(BufReader::new(io::stdin())));
            }
            let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
            Ok(Box::new(BufReader::new(file)))
        })
        .collect()
}

/// Lines of all inputs in order, without line terminators
///
/// Reading stops at the first I/O error, which is left in `error`.
pub fn lines<'a>(
    inputs: Vec<Box<dyn BufRead>>,
    error: &'a mut Option<io::Error>,
) -> impl Iterator<Item = String> + 'a {
    inputs
        .into_iter()
        .flat_map(|input| input.lines())
        .map_while(move |line| match line {
            Ok(line) => Some(line),
            Err(err) => {
                *error = Some(err);
                None
            }
        })
}
