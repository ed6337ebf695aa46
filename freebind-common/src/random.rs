//! Random address selection within CIDR ranges.
//!
//! None of this is meant to be unpredictable to an adversary: the generator is a small
//! non-cryptographic PRNG seeded from the clock.
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use crate::{bits, CidrRange, SocketAddress};

/// A fast PRNG seeded from the monotonic clock.
pub fn clock_seeded() -> SmallRng {
    SmallRng::seed_from_u64(monotonic_nanos())
}

/// `CLOCK_MONOTONIC` as nanoseconds, `0` if the clock is unavailable.
fn monotonic_nanos() -> u64 {
    // SAFETY: an all-zero `timespec` is valid.
    let mut now: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `now` is a live, writable `timespec`.
    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now) } != 0 {
        return 0;
    }

    (now.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(now.tv_nsec as u64)
}

/// Pick one range uniformly, `None` if there are none.
pub fn choose_range<'a, R: RngCore + ?Sized>(ranges: &'a [CidrRange], rng: &mut R) -> Option<&'a CidrRange> {
    ranges.choose(rng)
}

/// Generate a zero-port socket address whose network bits are those of `range` and whose host bits are random.
pub fn random_address<R: RngCore + ?Sized>(range: &CidrRange, rng: &mut R) -> SocketAddress {
    let family = range.family();
    let prefix_bits = usize::from(range.prefix_len());

    let mut octets = [0u8; 16];
    let address = &mut octets[..family.byte_len()];
    rng.fill_bytes(address);

    bits::clear_bits(address, 0, prefix_bits);
    bits::masked_merge(address, range.prefix(), prefix_bits);

    SocketAddress::from_octets(family, &octets)
}
