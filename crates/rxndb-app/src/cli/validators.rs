use crate::constants::MAX_BATCH_SIZE;

/// Validate batch size: a positive integer no larger than `MAX_BATCH_SIZE`.
pub fn validate_batch_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("batch size must be a positive integer: {s}"))?;

    if value == 0 {
        return Err("batch size must be >= 1".to_string());
    }

    if value > MAX_BATCH_SIZE {
        return Err(format!(
            "batch size {value} exceeds the maximum of {MAX_BATCH_SIZE}"
        ));
    }

    Ok(value)
}

/// Validate a collection id given on the command line (e.g. `5` for `table5`).
pub fn validate_table_no(s: &str) -> Result<u32, String> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| format!("table must be a non-negative integer: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_bounds() {
        assert_eq!(validate_batch_size("50"), Ok(50));
        assert_eq!(validate_batch_size(" 1 "), Ok(1));
        assert_eq!(validate_batch_size("10000"), Ok(MAX_BATCH_SIZE));
        assert!(validate_batch_size("0").is_err());
        assert!(validate_batch_size("10001").is_err());
        assert!(validate_batch_size("-3").is_err());
        assert!(validate_batch_size("many").is_err());
    }

    #[test]
    fn table_numbers_parse() {
        assert_eq!(validate_table_no("7"), Ok(7));
        assert!(validate_table_no("table7").is_err());
    }
}
