//! Symmetric stream ciphers keyed by a password.
//!
//! `transform` both encrypts and decrypts. None of these modes authenticate
//! their output and RC4 carries no nonce: the same buffer and password always
//! give the same cipher-text. Tampering is caught by the archive checksums,
//! not here.

use crate::model::EncryptionMode;

/// Apply `mode` keyed by `password` to `data`.
///
/// Every password and every input is accepted. An empty password leaves the
/// data untouched.
pub fn transform(data: &[u8], password: &[u8], mode: EncryptionMode) -> Vec<u8> {
    match mode {
        EncryptionMode::None => data.to_vec(),
        EncryptionMode::Xor => xor(data, password),
        EncryptionMode::Rc4 => {
            if password.is_empty() {
                return data.to_vec();
            }
            let mut out = data.to_vec();
            Rc4::new(password).apply(&mut out);
            out
        }
    }
}

fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// RC4 keystream generator. State lives for one `transform` call only.
struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Key-scheduling: permute the identity table under `key`.
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (idx, slot) in s.iter_mut().enumerate() {
            *slot = idx as u8;
        }

        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }

        Rc4 { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[idx as usize]
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }
}
