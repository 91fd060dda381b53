//! The typed-record catalog described in spec.md §4.2: a finite, versionable
//! set of entry ("jot") types, each cask embeds its own catalog so future
//! readers can parse unknown-type entries as opaque ("surrogate") records.

use crate::error::CaskadeError;
use crate::hashing::HashKey;
use crate::packer::{pack_adjsize4, read_str, read_u8, unpack_adjsize4, write_str, write_u8};

/// The known entry codes this build understands. Extensions would add more
/// variants here; everything else decodes as a surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JotCode {
    CaskHeader,
    Data,
    Link,
    CheckPoint,
    NextCask,
}

impl JotCode {
    pub fn code(self) -> u8 {
        match self {
            JotCode::CaskHeader => 0,
            JotCode::Data => 1,
            JotCode::Link => 2,
            JotCode::CheckPoint => 3,
            JotCode::NextCask => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<JotCode> {
        match code {
            0 => Some(JotCode::CaskHeader),
            1 => Some(JotCode::Data),
            2 => Some(JotCode::Link),
            3 => Some(JotCode::CheckPoint),
            4 => Some(JotCode::NextCask),
            _ => None,
        }
    }
}

/// One row of a catalog: a type's code, name, fixed header size, and whether
/// it carries a variable-size payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub entry_code: u8,
    pub entry_name: String,
    pub header_size: u16,
    pub has_payload: bool,
}

impl CatalogItem {
    fn pack(&self, buf: &mut Vec<u8>) {
        write_u8(buf, self.entry_code);
        write_str(buf, &self.entry_name);
        buf.extend(pack_adjsize4(self.header_size as usize));
        write_u8(buf, if self.has_payload { 1 } else { 0 });
    }

    fn unpack(buf: &[u8], offset: usize) -> Result<(CatalogItem, usize), CaskadeError> {
        let (entry_code, offset) =
            read_u8(buf, offset).map_err(|e| CaskadeError::Format(e.to_string()))?;
        let (entry_name, offset) =
            read_str(buf, offset).map_err(|e| CaskadeError::Format(e.to_string()))?;
        let (header_size, offset) =
            unpack_adjsize4(buf, offset).map_err(|e| CaskadeError::Format(e.to_string()))?;
        let (has_payload, offset) =
            read_u8(buf, offset).map_err(|e| CaskadeError::Format(e.to_string()))?;
        Ok((
            CatalogItem {
                entry_code,
                entry_name,
                header_size: header_size as u16,
                has_payload: has_payload != 0,
            },
            offset,
        ))
    }
}

fn header_len(code: JotCode) -> u16 {
    match code {
        JotCode::CaskHeader => 16 + 32 + 33 + 33,
        JotCode::Data => 32,
        JotCode::Link => 16 + 1 + 33,
        JotCode::CheckPoint => 32 + 4 + 4 + 1,
        JotCode::NextCask => 33,
    }
}

fn has_payload(code: JotCode) -> bool {
    match code {
        JotCode::CaskHeader => true,
        JotCode::Data => true,
        JotCode::Link => false,
        JotCode::CheckPoint => true,
        JotCode::NextCask => false,
    }
}

fn name_of(code: JotCode) -> &'static str {
    match code {
        JotCode::CaskHeader => "CASK_HEADER",
        JotCode::Data => "DATA",
        JotCode::Link => "LINK",
        JotCode::CheckPoint => "CHECK_POINT",
        JotCode::NextCask => "NEXT_CASK",
    }
}

fn base_items() -> Vec<CatalogItem> {
    [
        JotCode::CaskHeader,
        JotCode::Data,
        JotCode::Link,
        JotCode::CheckPoint,
        JotCode::NextCask,
    ]
    .iter()
    .map(|&code| CatalogItem {
        entry_code: code.code(),
        entry_name: name_of(code).to_owned(),
        header_size: header_len(code),
        has_payload: has_payload(code),
    })
    .collect()
}

/// A cask's merged view of entry types: the base catalog this build knows,
/// plus any surrogate types admitted from a catalog read off disk.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    pub binary: Vec<u8>,
    pub key: HashKey,
    pub has_surrogates: bool,
}

impl Catalog {
    /// The catalog this build writes into every newly created cask.
    pub fn base() -> Catalog {
        let items = base_items();
        let binary = Self::pack_items(&items);
        let key = HashKey::of(&binary);
        Catalog {
            items,
            binary,
            key,
            has_surrogates: false,
        }
    }

    fn pack_items(items: &[CatalogItem]) -> Vec<u8> {
        let mut buf = Vec::new();
        for item in items {
            item.pack(&mut buf);
        }
        buf
    }

    fn unpack_items(buf: &[u8]) -> Result<Vec<CatalogItem>, CaskadeError> {
        let mut items = Vec::new();
        let mut offset = 0;
        while offset < buf.len() {
            let (item, new_offset) = CatalogItem::unpack(buf, offset)?;
            items.push(item);
            offset = new_offset;
        }
        Ok(items)
    }

    /// Merges a catalog read from a `CASK_HEADER` payload with the base
    /// catalog this build knows. Known codes whose layout disagrees are a
    /// fatal format error; unknown codes are admitted as surrogates.
    pub fn merge_from_disk(payload: &[u8]) -> Result<Catalog, CaskadeError> {
        let other = Self::unpack_items(payload)?;
        let base = base_items();
        let mut by_code: std::collections::BTreeMap<u8, CatalogItem> =
            base.iter().cloned().map(|i| (i.entry_code, i)).collect();
        let mut has_surrogates = false;

        for item in &other {
            match by_code.get(&item.entry_code) {
                None => {
                    has_surrogates = true;
                    by_code.insert(item.entry_code, item.clone());
                }
                Some(known) if known == item => {}
                Some(known) => {
                    return Err(CaskadeError::Format(format!(
                        "catalog disagreement for code {}: {:?} != {:?}",
                        item.entry_code, known, item
                    )));
                }
            }
        }

        let items: Vec<CatalogItem> = by_code.into_values().collect();
        let binary = payload.to_vec();
        let key = HashKey::of(&binary);
        Ok(Catalog {
            items,
            binary,
            key,
            has_surrogates,
        })
    }

    pub fn find(&self, code: u8) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.entry_code == code)
    }

    pub fn is_known(&self, code: u8) -> bool {
        JotCode::from_code(code).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_catalog_round_trips_through_disk_bytes() {
        let base = Catalog::base();
        let merged = Catalog::merge_from_disk(&base.binary).unwrap();
        assert!(!merged.has_surrogates);
        assert_eq!(merged.key, base.key);
        for code in [0u8, 1, 2, 3, 4] {
            assert_eq!(merged.find(code), base.find(code));
        }
    }

    #[test]
    fn surrogate_type_is_admitted_without_disagreement() {
        let mut payload = Catalog::base().binary;
        let surrogate = CatalogItem {
            entry_code: 9,
            entry_name: "TAG".to_owned(),
            header_size: 4,
            has_payload: true,
        };
        surrogate.pack(&mut payload);
        let merged = Catalog::merge_from_disk(&payload).unwrap();
        assert!(merged.has_surrogates);
        assert_eq!(merged.find(9), Some(&surrogate));
        assert!(!merged.is_known(9));
    }

    #[test]
    fn known_code_disagreement_is_fatal() {
        let mut payload = Vec::new();
        let bogus = CatalogItem {
            entry_code: JotCode::Data.code(),
            entry_name: "DATA".to_owned(),
            header_size: 99,
            has_payload: true,
        };
        bogus.pack(&mut payload);
        assert!(Catalog::merge_from_disk(&payload).is_err());
    }
}
