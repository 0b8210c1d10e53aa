//! Guest environment variables.

/// Ordered `name -> value` mapping with unique names.
///
/// Iteration follows insertion order, which is the order `environ_get`
/// lays records out in guest memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environ {
    vars: Vec<(String, String)>,
}

impl Environ {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment guests get unless told otherwise.
    pub fn guest_default() -> Self {
        let mut env = Self::new();
        env.set("USER", "alice");
        env
    }

    /// Set a variable. An existing name keeps its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The `name=value` records in order, without terminators.
    pub fn records(&self) -> Vec<String> {
        self.iter().map(|(n, v)| format!("{}={}", n, v)).collect()
    }

    /// Parse a `NAME=VALUE` pair. The value may itself contain `=`.
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (name, value) = pair.split_once('=')?;
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), value.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environ {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

/// Table sizes reported by the `*_sizes_get` syscalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSizes {
    /// Number of entries.
    pub count: u32,
    /// Bytes needed for every entry plus its NUL terminator.
    pub buf_size: u32,
}

impl TableSizes {
    /// Sizes for a list of strings, each stored NUL-terminated.
    pub fn of<S: AsRef<str>>(entries: &[S]) -> Self {
        let buf_size = entries.iter().map(|e| e.as_ref().len() + 1).sum::<usize>();
        Self {
            count: entries.len() as u32,
            buf_size: buf_size as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut env = Environ::guest_default();
        env.set("HOME", "/");
        env.set("USER", "bob");
        let names: Vec<_> = env.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["USER", "HOME"]);
        assert_eq!(env.get("USER"), Some("bob"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn records_and_sizes() {
        let env: Environ = [("USER", "alice"), ("LANG", "C")].into_iter().collect();
        let records = env.records();
        assert_eq!(records, vec!["USER=alice", "LANG=C"]);
        assert_eq!(
            TableSizes::of(&records),
            TableSizes {
                count: 2,
                buf_size: 11 + 7
            }
        );
    }

    #[test]
    fn arg_sizes_sum_lengths_plus_terminators() {
        let argv = ["clang", "-cc1", "-o", "x.o"];
        let sizes = TableSizes::of(&argv);
        assert_eq!(sizes.count, 4);
        assert_eq!(sizes.buf_size, 6 + 5 + 3 + 4);
        assert_eq!(TableSizes::of::<&str>(&[]).buf_size, 0);
    }

    #[test]
    fn pair_parsing() {
        assert_eq!(
            Environ::parse_pair("A=b=c"),
            Some(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(Environ::parse_pair("A="), Some(("A".to_string(), String::new())));
        assert_eq!(Environ::parse_pair("=x"), None);
        assert_eq!(Environ::parse_pair("novalue"), None);
    }
}
