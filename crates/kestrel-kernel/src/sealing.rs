//! Sealed object table
//!
//! Queues and event channels are never named by raw pointer. Callers hold a
//! `SealedToken`, an opaque 64-bit value that packs a table index, the
//! slot's generation and the object type:
//!
//! ```text
//!  63      56 55      48 47            32 31                 0
//! ┌──────────┬──────────┬────────────────┬────────────────────┐
//! │ reserved │   type   │   generation   │       index        │
//! └──────────┴──────────┴────────────────┴────────────────────┘
//! ```
//!
//! `unseal_checked` is the gatekeeper. It fails closed: a token of the wrong
//! type, a stale generation, an empty slot or any reserved bit set all
//! resolve to nothing.

use alloc::vec::Vec;

use crate::objects::KernelObject;

/// Types of objects a token may be sealed as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    Queue = 1,
    EventChannel = 2,
}

impl ObjectType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Queue),
            2 => Some(Self::EventChannel),
            _ => None,
        }
    }

    fn of(object: &KernelObject) -> Self {
        match object {
            KernelObject::Queue(_) => ObjectType::Queue,
            KernelObject::EventChannel(_) => ObjectType::EventChannel,
        }
    }
}

/// Opaque, type-checked reference to a kernel object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SealedToken {
    index: u32,
    generation: u16,
    object_type: ObjectType,
}

const GENERATION_SHIFT: u32 = 32;
const TYPE_SHIFT: u32 = 48;
const RESERVED_MASK: u64 = 0xff << 56;

impl SealedToken {
    /// Encode for handing to a thread
    pub fn to_raw(self) -> u64 {
        u64::from(self.index)
            | (u64::from(self.generation) << GENERATION_SHIFT)
            | ((self.object_type as u64) << TYPE_SHIFT)
    }

    /// Decode a caller-supplied value
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw & RESERVED_MASK != 0 {
            return None;
        }
        Some(Self {
            index: raw as u32,
            generation: (raw >> GENERATION_SHIFT) as u16,
            object_type: ObjectType::from_u8((raw >> TYPE_SHIFT) as u8)?,
        })
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

/// Why a token failed to unseal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SealError {
    /// Reserved bits set or unknown type tag
    Malformed,
    /// Token was sealed as a different type
    WrongType,
    /// Object was destroyed, or the slot never held one
    Revoked,
}

struct Entry {
    generation: u16,
    object: Option<KernelObject>,
}

/// Generational table of sealed kernel objects.
#[derive(Default)]
pub struct ObjectTable {
    entries: Vec<Entry>,
    free: Vec<u32>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `object` and return a token sealed with its type
    pub fn insert(&mut self, object: KernelObject) -> SealedToken {
        let object_type = ObjectType::of(&object);
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index as usize].object = Some(object);
                index
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    object: Some(object),
                });
                (self.entries.len() - 1) as u32
            }
        };
        SealedToken {
            index,
            generation: self.entries[index as usize].generation,
            object_type,
        }
    }

    /// Resolve `raw` as an object of `expected` type.
    ///
    /// Never modifies the table.
    pub fn unseal_checked(
        &self,
        raw: u64,
        expected: ObjectType,
    ) -> Result<(SealedToken, &KernelObject), SealError> {
        let token = SealedToken::from_raw(raw).ok_or(SealError::Malformed)?;
        if token.object_type != expected {
            return Err(SealError::WrongType);
        }
        let entry = self
            .entries
            .get(token.index as usize)
            .filter(|e| e.generation == token.generation)
            .ok_or(SealError::Revoked)?;
        let object = entry.object.as_ref().ok_or(SealError::Revoked)?;
        // The stored object must agree with the tag it was sealed under.
        if ObjectType::of(object) != expected {
            return Err(SealError::WrongType);
        }
        Ok((token, object))
    }

    /// `unseal_checked` without the reason
    pub fn unseal(&self, raw: u64, expected: ObjectType) -> Option<&KernelObject> {
        self.unseal_checked(raw, expected).ok().map(|(_, o)| o)
    }

    /// Mutable variant of `unseal`
    pub fn unseal_mut(&mut self, raw: u64, expected: ObjectType) -> Option<&mut KernelObject> {
        let (token, _) = self.unseal_checked(raw, expected).ok()?;
        self.entries[token.index as usize].object.as_mut()
    }

    /// Destroy the object behind `raw`, revoking every copy of the token
    pub fn remove(&mut self, raw: u64, expected: ObjectType) -> Option<KernelObject> {
        let (token, _) = self.unseal_checked(raw, expected).ok()?;
        let entry = &mut self.entries[token.index as usize];
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(token.index);
        Some(object)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.object.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
