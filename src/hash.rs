use std::hash::Hasher;

const MAX_PRIME: u64 = 11_400_714_819_323_198_549;

/// A hasher optimized for hashing component type IDs.
///
/// `TypeId` feeds the hasher an opaque, fixed-length byte string; folding it
/// eight bytes at a time keeps the full identity without allocating.
#[derive(Default)]
pub struct ComponentTypeIdHasher(u64);

impl Hasher for ComponentTypeIdHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.0 = (self.0.rotate_left(5) ^ u64::from_ne_bytes(buf)).wrapping_mul(MAX_PRIME);
        }
    }
}

/// A hasher optimized for keys that are represented as a single u64.
#[derive(Default)]
pub struct U64Hasher(u64);

impl Hasher for U64Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.0 ^= u64::from_ne_bytes(buf).wrapping_mul(MAX_PRIME);
        }
    }

    fn write_u64(&mut self, seed: u64) {
        self.0 = seed.wrapping_mul(MAX_PRIME);
    }
}

#[test]
fn hasher() {
    use core::any::TypeId;
    use core::hash::{BuildHasherDefault, Hash};
    use std::collections::HashMap;

    fn hash_of<T: 'static + ?Sized>() -> u64 {
        let mut hasher = ComponentTypeIdHasher::default();
        TypeId::of::<T>().hash(&mut hasher);
        hasher.finish()
    }

    assert_ne!(hash_of::<usize>(), hash_of::<()>());
    assert_ne!(hash_of::<str>(), hash_of::<&'static str>());

    let mut map: HashMap<TypeId, u32, BuildHasherDefault<ComponentTypeIdHasher>> =
        HashMap::default();
    map.insert(TypeId::of::<usize>(), 1);
    map.insert(TypeId::of::<[u8; 20]>(), 2);
    assert_eq!(map.get(&TypeId::of::<usize>()), Some(&1));
    assert_eq!(map.get(&TypeId::of::<[u8; 20]>()), Some(&2));
}

#[test]
fn u64_hasher() {
    use core::hash::Hash;

    fn hash_of(seed: u64) -> u64 {
        let mut hasher = U64Hasher::default();
        seed.hash(&mut hasher);
        hasher.finish()
    }

    assert_ne!(hash_of(0), hash_of(1));
    assert_eq!(hash_of(42), hash_of(42));
}
