//! Directory listings as printed by `os.ls`.

use serde::{Deserialize, Serialize};

/// One row of a directory listing. Values are kept as the board printed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// `f` or `d` on Lua RTOS.
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
    pub date: String,
    pub name: String,
}

/// Console command listing `path`.
pub fn list_command(path: &str) -> String {
    format!("os.ls(\"{path}\")")
}

/// Parse `os.ls` output: one tab separated row per line with type, size,
/// date and name. Rows with any other number of fields are skipped.
pub fn parse_listing(output: &str) -> Vec<DirectoryEntry> {
    output
        .split('\n')
        .map(|line| line.replace('\r', ""))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                [kind, size, date, name] => Some(DirectoryEntry {
                    kind: kind.to_string(),
                    size: size.to_string(),
                    date: date.to_string(),
                    name: name.to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_row() {
        assert_eq!(
            parse_listing("file\t120\t2024-01-01\tmain.lua\n"),
            vec![DirectoryEntry {
                kind: "file".into(),
                size: "120".into(),
                date: "2024-01-01".into(),
                name: "main.lua".into(),
            }]
        );
    }

    #[test]
    fn test_crlf_rows_and_noise() {
        let output = "d\t\t\tlib\r\nf\t512\t2017-08-01 10:00\tautorun.lua\r\nUsed 12K of 512K";
        let entries = parse_listing(output);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, "d");
        assert_eq!(entries[0].name, "lib");
        assert_eq!(entries[1].size, "512");
        assert_eq!(entries[1].name, "autorun.lua");
    }

    #[test]
    fn test_serialized_type_key() {
        let entry = &parse_listing("f\t1\t-\ta")[0];
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["type"], "f");
    }
}
