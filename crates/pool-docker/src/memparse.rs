/// Parse a Docker-style memory limit string (`"512m"`, `"2g"`, `"1024k"`,
/// or a bare byte count) into bytes.
pub fn parse_mem_limit(spec: &str) -> Option<i64> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }
    let (digits, mult): (&str, i64) = match spec.chars().last()? {
        'b' | 'B' => (&spec[..spec.len() - 1], 1),
        'k' | 'K' => (&spec[..spec.len() - 1], 1024),
        'm' | 'M' => (&spec[..spec.len() - 1], 1024 * 1024),
        'g' | 'G' => (&spec[..spec.len() - 1], 1024 * 1024 * 1024),
        _ => (spec, 1),
    };
    digits.trim().parse::<i64>().ok().map(|n| n * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixes() {
        assert_eq!(parse_mem_limit("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_mem_limit("2g"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_mem_limit("100"), Some(100));
        assert_eq!(parse_mem_limit(""), None);
    }
}
