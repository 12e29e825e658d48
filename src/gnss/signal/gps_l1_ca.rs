pub const CODE_LENGTH:usize = 1023;
pub const CHIP_RATE_HZ:f64 = 1.023e6;
pub const CARRIER_FREQ_HZ:f64 = 1.57542e9;

// G2 delay in chips for PRN 1 through 32 (IS-GPS-200 Table 3-Ia)
const G2_DELAY:[usize; 32] = [
	  5,   6,   7,   8,  17,  18, 139, 140, 141, 251,
	252, 254, 255, 256, 257, 258, 469, 470, 471, 472,
	473, 474, 509, 512, 513, 514, 515, 516, 859, 860,
	861, 862,
];

pub const MAX_PRN:usize = G2_DELAY.len();

/// Returns the 1023-chip Gold code for `prn` with logical one as +1 and zero as -1, or None if the PRN is out of range
pub fn prn_int(prn:usize) -> Option<Vec<i8>> {
	if prn == 0 || prn > MAX_PRN { return None; }

	// Both shift registers start all ones.  Inside the registers a logical one is -1 so that XOR becomes a product;
	// the negated output maps a logical one back to +1.
	let mut g1 = [0i8; CODE_LENGTH];
	let mut g2 = [0i8; CODE_LENGTH];
	let mut r1 = [-1i8; 10];
	let mut r2 = [-1i8; 10];
	for i in 0..CODE_LENGTH {
		g1[i] = r1[9];
		g2[i] = r2[9];
		let c1 = r1[2] * r1[9];
		let c2 = r2[1] * r2[2] * r2[5] * r2[7] * r2[8] * r2[9];
		r1.rotate_right(1);
		r2.rotate_right(1);
		r1[0] = c1;
		r2[0] = c2;
	}

	let delay = G2_DELAY[prn - 1];
	Some((0..CODE_LENGTH).map(|i| -g1[i] * g2[(i + CODE_LENGTH - delay) % CODE_LENGTH]).collect())
}
