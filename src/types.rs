/// A single entry of a sparse row or column: the index of the partner
/// dimension and the rating value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
    pub idx: u32,
    pub value: f64,
}

impl Entry {
    pub fn new(idx: u32, value: f64) -> Self {
        Entry { idx, value }
    }
}

/// Seeds for the two logically distinct sources of randomness: tie-breaking
/// and exploration. Deriving both from one master seed keeps a whole
/// simulation reproducible from a single number.
#[derive(Clone, Copy, Debug)]
pub struct Seeds {
    pub untie: u64,
    pub explore: u64,
}

impl Seeds {
    pub fn derive(master: u64) -> Self {
        Seeds {
            untie: master,
            explore: splitmix(master),
        }
    }
}

// One round of splitmix64, enough to decorrelate the two streams.
fn splitmix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
