use serde::{Deserialize, Serialize};

/// Class-index → name table supplied with the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Name for `index`, or the index itself when the table has no entry.
    pub fn resolve(&self, index: i32) -> String {
        match self.get(index) {
            Some(name) => name.to_string(),
            None => {
                log::warn!("label index {} not in label table; publishing raw id", index);
                index.to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_and_unknown_indices() {
        let labels = LabelTable::new(["cone", "cube"]);
        assert_eq!(labels.resolve(1), "cube");
        assert_eq!(labels.resolve(7), "7");
        assert_eq!(labels.resolve(-1), "-1");
        assert_eq!(labels.len(), 2);
    }
}
