pub const XOR_FOLD_ENTRY: &str = "xor_fold_batch";

pub const XOR_FOLD: &str = r#"
#define DIGEST_LEN 32
#define XOR_FOLD_ROUNDS 4

inline uchar rotl8(uchar x, uint n) {
    return (uchar)((x << n) | (x >> (8 - n)));
}

__kernel void xor_fold_batch(
    __global const uchar* input,   // template bytes, nonce excluded
    const uint input_len,
    const ulong start_nonce,
    __global uchar* output         // DIGEST_LEN bytes per work-item
) {
    size_t gid = get_global_id(0);
    ulong nonce = start_nonce + gid;

    uchar s[DIGEST_LEN];
    for (uint i = 0; i < DIGEST_LEN; ++i) {
        s[i] = (uchar)(i * 0x1d + 0x5b);
    }

    // Candidate = template || nonce (big-endian)
    uint total = input_len + 8;
    for (uint j = 0; j < total; ++j) {
        uchar b;
        if (j < input_len) {
            b = input[j];
        } else {
            b = (uchar)(nonce >> (8 * (7 - (j - input_len))));
        }
        uint k = j % DIGEST_LEN;
        s[k] = (uchar)(rotl8((uchar)(s[k] ^ b), 3) + s[(k + 1) % DIGEST_LEN]);
    }

    for (uint r = 0; r < XOR_FOLD_ROUNDS; ++r) {
        for (uint k = 0; k < DIGEST_LEN; ++k) {
            uchar prev = s[(k + DIGEST_LEN - 1) % DIGEST_LEN];
            s[k] ^= rotl8((uchar)(prev + r), 5);
        }
    }

    for (uint i = 0; i < DIGEST_LEN; ++i) {
        output[gid * DIGEST_LEN + i] = s[i];
    }
}
"#;

pub const SCRYPT_ENTRY: &str = "scrypt_batch";

/// ROMix scratch per work-item, in `u32` words (N = 1024 blocks of 128 bytes).
pub const SCRYPT_SCRATCH_WORDS: usize = 1024 * 32;

/// scrypt(N=1024, r=1, p=1) with an empty salt and a 32-byte output; the
/// candidate is the password.
pub const SCRYPT: &str = r#"
#define DIGEST_LEN 32
#define SCRYPT_N 1024
#define BLOCK_WORDS 32

#define ROTR(x, n) rotate((uint)(x), (uint)(32 - (n)))

__constant uint K256[64] = {
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2
};

typedef struct {
    uint h[8];
    uchar buf[64];
    uint buf_len;
    ulong total;
} sha256_ctx;

void sha256_compress(uint* h, const uchar* blk) {
    uint w[64];
    for (uint i = 0; i < 16; ++i) {
        w[i] = ((uint)blk[4 * i] << 24) | ((uint)blk[4 * i + 1] << 16)
             | ((uint)blk[4 * i + 2] << 8) | (uint)blk[4 * i + 3];
    }
    for (uint i = 16; i < 64; ++i) {
        uint s0 = ROTR(w[i - 15], 7) ^ ROTR(w[i - 15], 18) ^ (w[i - 15] >> 3);
        uint s1 = ROTR(w[i - 2], 17) ^ ROTR(w[i - 2], 19) ^ (w[i - 2] >> 10);
        w[i] = w[i - 16] + s0 + w[i - 7] + s1;
    }

    uint a = h[0], b = h[1], c = h[2], d = h[3];
    uint e = h[4], f = h[5], g = h[6], hh = h[7];
    for (uint i = 0; i < 64; ++i) {
        uint t1 = hh + (ROTR(e, 6) ^ ROTR(e, 11) ^ ROTR(e, 25)) + ((e & f) ^ (~e & g))
                + K256[i] + w[i];
        uint t2 = (ROTR(a, 2) ^ ROTR(a, 13) ^ ROTR(a, 22)) + ((a & b) ^ (a & c) ^ (b & c));
        hh = g; g = f; f = e; e = d + t1;
        d = c; c = b; b = a; a = t1 + t2;
    }
    h[0] += a; h[1] += b; h[2] += c; h[3] += d;
    h[4] += e; h[5] += f; h[6] += g; h[7] += hh;
}

void sha256_init(sha256_ctx* c) {
    c->h[0] = 0x6a09e667; c->h[1] = 0xbb67ae85; c->h[2] = 0x3c6ef372; c->h[3] = 0xa54ff53a;
    c->h[4] = 0x510e527f; c->h[5] = 0x9b05688c; c->h[6] = 0x1f83d9ab; c->h[7] = 0x5be0cd19;
    c->buf_len = 0;
    c->total = 0;
}

void sha256_byte(sha256_ctx* c, uchar b) {
    c->buf[c->buf_len++] = b;
    c->total++;
    if (c->buf_len == 64) {
        sha256_compress(c->h, c->buf);
        c->buf_len = 0;
    }
}

void sha256_final(sha256_ctx* c, uchar* out) {
    ulong bits = c->total * 8;
    sha256_byte(c, 0x80);
    while (c->buf_len != 56) {
        sha256_byte(c, 0);
    }
    for (int i = 7; i >= 0; --i) {
        sha256_byte(c, (uchar)(bits >> (8 * i)));
    }
    for (uint i = 0; i < 8; ++i) {
        out[4 * i] = (uchar)(c->h[i] >> 24);
        out[4 * i + 1] = (uchar)(c->h[i] >> 16);
        out[4 * i + 2] = (uchar)(c->h[i] >> 8);
        out[4 * i + 3] = (uchar)c->h[i];
    }
}

// Candidate = template || nonce (big-endian)
void feed_candidate(sha256_ctx* c, __global const uchar* input, uint input_len, ulong nonce) {
    for (uint i = 0; i < input_len; ++i) {
        sha256_byte(c, input[i]);
    }
    for (int i = 7; i >= 0; --i) {
        sha256_byte(c, (uchar)(nonce >> (8 * i)));
    }
}

void hmac_sha256(const sha256_ctx* ipad, const sha256_ctx* opad,
                 const uchar* msg, uint len, uchar* out) {
    uchar inner[DIGEST_LEN];
    sha256_ctx c = *ipad;
    for (uint i = 0; i < len; ++i) {
        sha256_byte(&c, msg[i]);
    }
    sha256_final(&c, inner);
    c = *opad;
    for (uint i = 0; i < DIGEST_LEN; ++i) {
        sha256_byte(&c, inner[i]);
    }
    sha256_final(&c, out);
}

void salsa20_8(uint* B) {
    uint x[16];
    for (uint i = 0; i < 16; ++i) {
        x[i] = B[i];
    }
    for (uint i = 0; i < 8; i += 2) {
        x[ 4] ^= rotate(x[ 0] + x[12],  7U); x[ 8] ^= rotate(x[ 4] + x[ 0],  9U);
        x[12] ^= rotate(x[ 8] + x[ 4], 13U); x[ 0] ^= rotate(x[12] + x[ 8], 18U);
        x[ 9] ^= rotate(x[ 5] + x[ 1],  7U); x[13] ^= rotate(x[ 9] + x[ 5],  9U);
        x[ 1] ^= rotate(x[13] + x[ 9], 13U); x[ 5] ^= rotate(x[ 1] + x[13], 18U);
        x[14] ^= rotate(x[10] + x[ 6],  7U); x[ 2] ^= rotate(x[14] + x[10],  9U);
        x[ 6] ^= rotate(x[ 2] + x[14], 13U); x[10] ^= rotate(x[ 6] + x[ 2], 18U);
        x[ 3] ^= rotate(x[15] + x[11],  7U); x[ 7] ^= rotate(x[ 3] + x[15],  9U);
        x[11] ^= rotate(x[ 7] + x[ 3], 13U); x[15] ^= rotate(x[11] + x[ 7], 18U);

        x[ 1] ^= rotate(x[ 0] + x[ 3],  7U); x[ 2] ^= rotate(x[ 1] + x[ 0],  9U);
        x[ 3] ^= rotate(x[ 2] + x[ 1], 13U); x[ 0] ^= rotate(x[ 3] + x[ 2], 18U);
        x[ 6] ^= rotate(x[ 5] + x[ 4],  7U); x[ 7] ^= rotate(x[ 6] + x[ 5],  9U);
        x[ 4] ^= rotate(x[ 7] + x[ 6], 13U); x[ 5] ^= rotate(x[ 4] + x[ 7], 18U);
        x[11] ^= rotate(x[10] + x[ 9],  7U); x[ 8] ^= rotate(x[11] + x[10],  9U);
        x[ 9] ^= rotate(x[ 8] + x[11], 13U); x[10] ^= rotate(x[ 9] + x[ 8], 18U);
        x[12] ^= rotate(x[15] + x[14],  7U); x[13] ^= rotate(x[12] + x[15],  9U);
        x[14] ^= rotate(x[13] + x[12], 13U); x[15] ^= rotate(x[14] + x[13], 18U);
    }
    for (uint i = 0; i < 16; ++i) {
        B[i] += x[i];
    }
}

// BlockMix with r = 1: Y0 = salsa(X1 ^ X0), Y1 = salsa(Y0 ^ X1), result Y0 || Y1.
void blockmix_r1(uint* X) {
    for (uint k = 0; k < 16; ++k) {
        X[k] ^= X[16 + k];
    }
    salsa20_8(X);
    for (uint k = 0; k < 16; ++k) {
        X[16 + k] ^= X[k];
    }
    salsa20_8(X + 16);
}

__kernel void scrypt_batch(
    __global const uchar* input,   // template bytes, nonce excluded
    const uint input_len,
    const ulong start_nonce,
    __global uint* scratch,        // SCRYPT_N * BLOCK_WORDS words per work-item
    __global uchar* output         // DIGEST_LEN bytes per work-item
) {
    size_t gid = get_global_id(0);
    ulong nonce = start_nonce + gid;
    __global uint* V = scratch + gid * (SCRYPT_N * BLOCK_WORDS);

    // HMAC key: the candidate, hashed first when longer than one block
    uchar k0[64];
    for (uint i = 0; i < 64; ++i) {
        k0[i] = 0;
    }
    if (input_len + 8 > 64) {
        sha256_ctx t;
        sha256_init(&t);
        feed_candidate(&t, input, input_len, nonce);
        sha256_final(&t, k0);
    } else {
        for (uint i = 0; i < input_len; ++i) {
            k0[i] = input[i];
        }
        for (uint i = 0; i < 8; ++i) {
            k0[input_len + i] = (uchar)(nonce >> (8 * (7 - i)));
        }
    }

    sha256_ctx ipad, opad;
    sha256_init(&ipad);
    sha256_init(&opad);
    for (uint i = 0; i < 64; ++i) {
        sha256_byte(&ipad, k0[i] ^ 0x36);
        sha256_byte(&opad, k0[i] ^ 0x5c);
    }

    // B = PBKDF2-HMAC-SHA256(P, "", 1, 128), read as little-endian words
    uint X[BLOCK_WORDS];
    uchar msg[4 * BLOCK_WORDS + 4];
    uchar t[DIGEST_LEN];
    for (uint blk = 0; blk < 4; ++blk) {
        msg[0] = 0; msg[1] = 0; msg[2] = 0; msg[3] = (uchar)(blk + 1);
        hmac_sha256(&ipad, &opad, msg, 4, t);
        for (uint w = 0; w < 8; ++w) {
            X[blk * 8 + w] = (uint)t[4 * w] | ((uint)t[4 * w + 1] << 8)
                           | ((uint)t[4 * w + 2] << 16) | ((uint)t[4 * w + 3] << 24);
        }
    }

    // ROMix
    for (uint i = 0; i < SCRYPT_N; ++i) {
        for (uint w = 0; w < BLOCK_WORDS; ++w) {
            V[i * BLOCK_WORDS + w] = X[w];
        }
        blockmix_r1(X);
    }
    for (uint i = 0; i < SCRYPT_N; ++i) {
        uint j = X[16] & (SCRYPT_N - 1);
        for (uint w = 0; w < BLOCK_WORDS; ++w) {
            X[w] ^= V[j * BLOCK_WORDS + w];
        }
        blockmix_r1(X);
    }

    // digest = PBKDF2-HMAC-SHA256(P, B', 1, 32)
    for (uint w = 0; w < BLOCK_WORDS; ++w) {
        msg[4 * w] = (uchar)X[w];
        msg[4 * w + 1] = (uchar)(X[w] >> 8);
        msg[4 * w + 2] = (uchar)(X[w] >> 16);
        msg[4 * w + 3] = (uchar)(X[w] >> 24);
    }
    msg[128] = 0; msg[129] = 0; msg[130] = 0; msg[131] = 1;
    hmac_sha256(&ipad, &opad, msg, 4 * BLOCK_WORDS + 4, t);

    for (uint i = 0; i < DIGEST_LEN; ++i) {
        output[gid * DIGEST_LEN + i] = t[i];
    }
}
"#;
