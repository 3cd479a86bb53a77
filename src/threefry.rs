use std::fmt::Debug;

use rand::rand_core::impls;
use rand::{RngCore, SeedableRng};

/// Word type of a Threefry engine.
///
/// Only `u32` and `u64` implement this, which makes an engine over any other
/// integer width a type error rather than a runtime failure.
pub trait ThreefryWord:
    Copy + Clone + Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    /// Key schedule parity constant of the Threefish cipher.
    const PARITY: Self;
    /// Rotation constants for the two-lane variant.
    const ROT_2: [u32; 8];
    /// Rotation constants for the four-lane variant, first mix.
    const ROT_4_0: [u32; 8];
    /// Rotation constants for the four-lane variant, second mix.
    const ROT_4_1: [u32; 8];

    fn wrapping_add(self, rhs: Self) -> Self;
    fn rotate_left(self, n: u32) -> Self;
    fn xor(self, rhs: Self) -> Self;
    fn from_u64(value: u64) -> Self;
    fn to_u64(self) -> u64;
    fn from_usize(value: usize) -> Self;
}

impl ThreefryWord for u32 {
    const PARITY: Self = 0x1BD1_1BDA;
    const ROT_2: [u32; 8] = [13, 15, 26, 6, 17, 29, 16, 24];
    const ROT_4_0: [u32; 8] = [10, 11, 13, 23, 6, 17, 25, 18];
    const ROT_4_1: [u32; 8] = [26, 21, 27, 5, 20, 11, 10, 20];

    fn wrapping_add(self, rhs: Self) -> Self {
        u32::wrapping_add(self, rhs)
    }

    fn rotate_left(self, n: u32) -> Self {
        u32::rotate_left(self, n)
    }

    fn xor(self, rhs: Self) -> Self {
        self ^ rhs
    }

    fn from_u64(value: u64) -> Self {
        value as u32
    }

    fn to_u64(self) -> u64 {
        self as u64
    }

    fn from_usize(value: usize) -> Self {
        value as u32
    }
}

impl ThreefryWord for u64 {
    const PARITY: Self = 0x1BD1_1BDA_A9FC_1A22;
    const ROT_2: [u32; 8] = [16, 42, 12, 31, 16, 32, 24, 21];
    const ROT_4_0: [u32; 8] = [14, 52, 23, 5, 25, 46, 58, 32];
    const ROT_4_1: [u32; 8] = [16, 57, 40, 37, 33, 12, 22, 32];

    fn wrapping_add(self, rhs: Self) -> Self {
        u64::wrapping_add(self, rhs)
    }

    fn rotate_left(self, n: u32) -> Self {
        u64::rotate_left(self, n)
    }

    fn xor(self, rhs: Self) -> Self {
        self ^ rhs
    }

    fn from_u64(value: u64) -> Self {
        value
    }

    fn to_u64(self) -> u64 {
        self
    }

    fn from_usize(value: usize) -> Self {
        value as u64
    }
}

fn increment<W: ThreefryWord>(ctr: &mut [W]) {
    for word in ctr.iter_mut() {
        *word = word.wrapping_add(W::from_u64(1));
        if *word != W::default() {
            break;
        }
    }
}

/// Two-lane Threefry counter-based engine.
///
/// The state is a counter and a key. Each generated block runs `R` keyed
/// rotation rounds over a copy of the counter, with key material re-injected
/// every four rounds. Skip-ahead is just counter arithmetic, so streams with
/// distinct keys or counters are independent and reproducible.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Threefry2<W: ThreefryWord, const R: usize = 20> {
    ctr: [W; 2],
    res: [W; 2],
    key: [W; 2],
    par: [W; 3],
    remain: usize,
}

/// Four-lane Threefry counter-based engine.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Threefry4<W: ThreefryWord, const R: usize = 20> {
    ctr: [W; 4],
    res: [W; 4],
    key: [W; 4],
    par: [W; 5],
    remain: usize,
}

impl<W: ThreefryWord, const R: usize> Threefry2<W, R> {
    pub fn new(seed: u64) -> Self {
        let mut engine = Self {
            ctr: [W::default(); 2],
            res: [W::default(); 2],
            key: [W::default(); 2],
            par: [W::default(); 3],
            remain: 0,
        };
        engine.seed(seed);
        engine
    }

    /// Reset counter and buffer, set the key from a single scalar.
    pub fn seed(&mut self, seed: u64) {
        self.ctr = [W::default(); 2];
        self.res = [W::default(); 2];
        self.key = [W::default(); 2];
        self.key[0] = W::from_u64(seed);
        self.init_par();
        self.remain = 0;
    }

    pub fn key(&self) -> &[W; 2] {
        &self.key
    }

    pub fn ctr(&self) -> &[W; 2] {
        &self.ctr
    }

    pub fn set_key(&mut self, key: [W; 2]) {
        self.key = key;
        self.init_par();
        self.remain = 0;
    }

    pub fn set_ctr(&mut self, ctr: [W; 2]) {
        self.ctr = ctr;
        self.remain = 0;
    }

    /// Next raw output word.
    pub fn next_word(&mut self) -> W {
        if self.remain > 0 {
            self.remain -= 1;
            return self.res[self.remain];
        }

        increment(&mut self.ctr);
        self.res = self.ctr;
        self.generate();
        self.remain = 1;
        self.res[1]
    }

    /// Advance the state by `n` outputs.
    pub fn discard(&mut self, n: u64) {
        for _ in 0..n {
            self.next_word();
        }
    }

    fn init_par(&mut self) {
        self.par[0] = self.key[0];
        self.par[1] = self.key[1];
        self.par[2] = W::PARITY.xor(self.key[0]).xor(self.key[1]);
    }

    fn generate(&mut self) {
        let s = &mut self.res;
        for n in 0..=R {
            if n > 0 {
                let rot = W::ROT_2[(n - 1) % 8];
                s[0] = s[0].wrapping_add(s[1]);
                s[1] = s[1].rotate_left(rot).xor(s[0]);
            }
            if n % 4 == 0 {
                let inc = n / 4;
                s[0] = s[0].wrapping_add(self.par[inc % 3]);
                s[1] = s[1].wrapping_add(self.par[(inc + 1) % 3]);
                s[1] = s[1].wrapping_add(W::from_usize(inc));
            }
        }
    }
}

impl<W: ThreefryWord, const R: usize> Threefry4<W, R> {
    pub fn new(seed: u64) -> Self {
        let mut engine = Self {
            ctr: [W::default(); 4],
            res: [W::default(); 4],
            key: [W::default(); 4],
            par: [W::default(); 5],
            remain: 0,
        };
        engine.seed(seed);
        engine
    }

    /// Reset counter and buffer, set the key from a single scalar.
    pub fn seed(&mut self, seed: u64) {
        self.ctr = [W::default(); 4];
        self.res = [W::default(); 4];
        self.key = [W::default(); 4];
        self.key[0] = W::from_u64(seed);
        self.init_par();
        self.remain = 0;
    }

    pub fn key(&self) -> &[W; 4] {
        &self.key
    }

    pub fn ctr(&self) -> &[W; 4] {
        &self.ctr
    }

    pub fn set_key(&mut self, key: [W; 4]) {
        self.key = key;
        self.init_par();
        self.remain = 0;
    }

    pub fn set_ctr(&mut self, ctr: [W; 4]) {
        self.ctr = ctr;
        self.remain = 0;
    }

    /// Next raw output word.
    pub fn next_word(&mut self) -> W {
        if self.remain > 0 {
            self.remain -= 1;
            return self.res[self.remain];
        }

        increment(&mut self.ctr);
        self.res = self.ctr;
        self.generate();
        self.remain = 3;
        self.res[3]
    }

    /// Advance the state by `n` outputs.
    pub fn discard(&mut self, n: u64) {
        for _ in 0..n {
            self.next_word();
        }
    }

    fn init_par(&mut self) {
        let mut parity = W::PARITY;
        for (par, key) in self.par.iter_mut().zip(self.key.iter()) {
            *par = *key;
            parity = parity.xor(*key);
        }
        self.par[4] = parity;
    }

    fn generate(&mut self) {
        let s = &mut self.res;
        for n in 0..=R {
            if n > 0 {
                let rot = (n - 1) % 8;
                // Lane pairing alternates between odd and even rounds.
                let (i0, i2) = if n % 2 == 1 { (1, 3) } else { (3, 1) };
                s[0] = s[0].wrapping_add(s[i0]);
                s[i0] = s[i0].rotate_left(W::ROT_4_0[rot]).xor(s[0]);
                s[2] = s[2].wrapping_add(s[i2]);
                s[i2] = s[i2].rotate_left(W::ROT_4_1[rot]).xor(s[2]);
            }
            if n % 4 == 0 {
                let inc = n / 4;
                for (j, lane) in s.iter_mut().enumerate() {
                    *lane = lane.wrapping_add(self.par[(inc + j) % 5]);
                }
                s[3] = s[3].wrapping_add(W::from_usize(inc));
            }
        }
    }
}

// Engines compare equal iff counter, key and buffered-remain count agree.
// The buffer contents beyond `remain` are implied by those three.
impl<W: ThreefryWord, const R: usize> PartialEq for Threefry2<W, R> {
    fn eq(&self, other: &Self) -> bool {
        self.ctr == other.ctr && self.key == other.key && self.remain == other.remain
    }
}

impl<W: ThreefryWord, const R: usize> Eq for Threefry2<W, R> {}

impl<W: ThreefryWord, const R: usize> PartialEq for Threefry4<W, R> {
    fn eq(&self, other: &Self) -> bool {
        self.ctr == other.ctr && self.key == other.key && self.remain == other.remain
    }
}

impl<W: ThreefryWord, const R: usize> Eq for Threefry4<W, R> {}

/// Threefry with two 32 bit lanes and 20 rounds.
pub type Threefry2x32 = Threefry2<u32>;
/// Threefry with four 32 bit lanes and 20 rounds.
pub type Threefry4x32 = Threefry4<u32>;
/// Threefry with two 64 bit lanes and 20 rounds.
pub type Threefry2x64 = Threefry2<u64>;
/// Threefry with four 64 bit lanes and 20 rounds.
pub type Threefry4x64 = Threefry4<u64>;

impl<const R: usize> RngCore for Threefry2<u32, R> {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
}

impl<const R: usize> RngCore for Threefry4<u32, R> {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
}

impl<const R: usize> RngCore for Threefry2<u64, R> {
    fn next_u32(&mut self) -> u32 {
        self.next_word() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_word()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
}

impl<const R: usize> RngCore for Threefry4<u64, R> {
    fn next_u32(&mut self) -> u32 {
        self.next_word() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_word()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
}

macro_rules! impl_seedable {
    ($engine:ident, $word:ty, $lanes:expr, $bytes:expr) => {
        impl<const R: usize> SeedableRng for $engine<$word, R> {
            type Seed = [u8; $bytes];

            fn from_seed(seed: Self::Seed) -> Self {
                let mut key = [0 as $word; $lanes];
                let width = std::mem::size_of::<$word>();
                for (lane, chunk) in key.iter_mut().zip(seed.chunks_exact(width)) {
                    let mut bytes = [0u8; std::mem::size_of::<$word>()];
                    bytes.copy_from_slice(chunk);
                    *lane = <$word>::from_le_bytes(bytes);
                }
                let mut engine = Self::new(0);
                engine.set_key(key);
                engine
            }

            fn seed_from_u64(state: u64) -> Self {
                Self::new(state)
            }
        }
    };
}

impl_seedable!(Threefry2, u32, 2, 8);
impl_seedable!(Threefry4, u32, 4, 16);
impl_seedable!(Threefry2, u64, 2, 16);
impl_seedable!(Threefry4, u64, 4, 32);

/// Combine two engines by XORing their outputs.
///
/// Both engines are seeded from the same scalar; the composition inherits the
/// larger period of the two.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XorCombine<E1, E2> {
    eng1: E1,
    eng2: E2,
}

impl<E1: SeedableRng, E2: SeedableRng> XorCombine<E1, E2> {
    pub fn new(seed: u64) -> Self {
        Self {
            eng1: E1::seed_from_u64(seed),
            eng2: E2::seed_from_u64(seed),
        }
    }
}

impl<E1, E2> XorCombine<E1, E2> {
    pub fn eng1(&mut self) -> &mut E1 {
        &mut self.eng1
    }

    pub fn eng2(&mut self) -> &mut E2 {
        &mut self.eng2
    }
}

impl<E1: RngCore, E2: RngCore> XorCombine<E1, E2> {
    /// Advance both engines by `n` outputs.
    pub fn discard(&mut self, n: u64) {
        for _ in 0..n {
            self.next_u64();
        }
    }
}

impl<E1: RngCore, E2: RngCore> RngCore for XorCombine<E1, E2> {
    fn next_u32(&mut self) -> u32 {
        self.eng1.next_u32() ^ self.eng2.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.eng1.next_u64() ^ self.eng2.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }
}

impl<E1: SeedableRng + RngCore, E2: SeedableRng + RngCore> SeedableRng for XorCombine<E1, E2> {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::Rng;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Threefry4x64::new(42);
        let mut b = Threefry4x64::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_word(), b.next_word());
        }
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Threefry4x64::new(1);
        let mut b = Threefry4x64::new(2);
        let xs: Vec<u64> = (0..16).map(|_| a.next_word()).collect();
        let ys: Vec<u64> = (0..16).map(|_| b.next_word()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn reseed_restarts_stream() {
        let mut engine = Threefry2x32::new(7);
        let first: Vec<u32> = (0..8).map(|_| engine.next_word()).collect();
        engine.seed(7);
        let second: Vec<u32> = (0..8).map(|_| engine.next_word()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn equality_ignores_spent_buffer() {
        let mut a = Threefry4x32::new(3);
        let b = Threefry4x32::new(3);
        assert_eq!(a, b);
        a.next_word();
        assert_ne!(a, b);
        // One full block later the counters match again but remain differs.
        let mut c = Threefry4x32::new(3);
        for _ in 0..4 {
            c.next_word();
        }
        let mut d = Threefry4x32::new(3);
        for _ in 0..4 {
            d.next_word();
        }
        assert_eq!(c, d);
    }

    proptest! {
        #[test]
        fn discard_matches_sequential(seed in any::<u64>(), skip in 0u64..200) {
            let mut a = Threefry4x64::new(seed);
            let mut b = Threefry4x64::new(seed);
            a.discard(skip);
            for _ in 0..skip {
                b.next_word();
            }
            prop_assert_eq!(a.next_word(), b.next_word());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn two_lane_discard_matches_sequential(seed in any::<u64>(), skip in 0u64..200) {
            let mut a = Threefry2x64::new(seed);
            let mut b = Threefry2x64::new(seed);
            a.discard(skip);
            for _ in 0..skip {
                b.next_word();
            }
            prop_assert_eq!(a.next_word(), b.next_word());
        }
    }

    #[test]
    fn rng_core_uniform_draws_are_in_unit_interval() {
        let mut engine = Threefry4x64::new(11);
        for _ in 0..1000 {
            let u: f64 = engine.random();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn from_seed_sets_full_key() {
        let mut seed = [0u8; 32];
        seed[0] = 1;
        seed[8] = 2;
        let engine = Threefry4x64::from_seed(seed);
        assert_eq!(engine.key(), &[1, 2, 0, 0]);
    }

    #[test]
    fn xor_combine_is_deterministic() {
        let mut a: XorCombine<Threefry2x64, Threefry4x64> = XorCombine::new(5);
        let mut b: XorCombine<Threefry2x64, Threefry4x64> = XorCombine::new(5);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        a.discard(3);
        b.next_u64();
        b.next_u64();
        b.next_u64();
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
