//! Code mutation: randomized but equivalent runtime helpers.
//!
//! Each generator emits a self-contained declaration of the form
//!
//! ```text
//! local F; do ...; F=function(...) ... end end
//! ```
//!
//! so helper locals stay scoped inside the `do` block and only `F` escapes.
//! All names come from the supplied [`NameSupply`], and the template shape
//! is chosen from a small set of equivalent variants, so two runs never
//! share a byte signature. Given the same supply the output is identical.

use crate::random::NameSupply;

/// Standard Base64 alphabet, as the runtime decoder indexes it.
const B64_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A generated code fragment and the names it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// The declaration text.
    pub text: String,
    /// Name of the function the declaration defines.
    pub entry: String,
    /// Every identifier bound by the fragment, `entry` included.
    pub bindings: Vec<String>,
}

/// Base64 decoder: `F(encoded) -> bytes`.
pub fn base64_decoder<N: NameSupply + ?Sized>(names: &mut N) -> Snippet {
    let f = names.fresh(8);
    let alpha = names.fresh(3);
    let data = names.fresh(4);
    let res = names.fresh(4);
    let i = names.fresh(1);
    let c1 = names.fresh(2);
    let c2 = names.fresh(2);
    let c3 = names.fresh(2);
    let c4 = names.fresh(2);
    let mut bindings = vec![
        f.clone(),
        alpha.clone(),
        data.clone(),
        res.clone(),
        i.clone(),
        c1.clone(),
        c2.clone(),
        c3.clone(),
        c4.clone(),
    ];

    let sub = |offset: usize| {
        if offset == 0 {
            format!("string.sub({data},{i},{i})")
        } else {
            format!("string.sub({data},{i}+{offset},{i}+{offset})")
        }
    };

    // Sextet lookup: 64 marks padding or a stripped character.
    let (prelude, sextets) = match names.variant(2) {
        0 => {
            let sextets: Vec<String> = (0..4)
                .map(|o| format!("(string.find({alpha},{},1,true) or 65)-1", sub(o)))
                .collect();
            (String::new(), sextets)
        }
        _ => {
            let lut = names.fresh(5);
            let k = names.fresh(1);
            bindings.push(lut.clone());
            bindings.push(k.clone());
            let prelude = format!(
                "local {lut}={{}}; for {k}=1,64 do {lut}[string.sub({alpha},{k},{k})]={k}-1 end; "
            );
            let sextets: Vec<String> = (0..4)
                .map(|o| format!("{lut}[{}] or 64", sub(o)))
                .collect();
            (prelude, sextets)
        }
    };

    let text = format!(
        "local {f}; do local {alpha}='{B64_ALPHABET}'; {prelude}{f}=function({data}) \
         {data}=string.gsub({data},'[^'..{alpha}..'=]',''); local {res}={{}}; \
         for {i}=1,#{data},4 do local {c1},{c2},{c3},{c4}={s0},{s1},{s2},{s3}; \
         {res}[#{res}+1]=string.char(bit32.lshift({c1},2)+bit32.rshift({c2},4)); \
         if {c3}<64 then {res}[#{res}+1]=\
         string.char(bit32.lshift(bit32.band({c2},15),4)+bit32.rshift({c3},2)); \
         if {c4}<64 then {res}[#{res}+1]=\
         string.char(bit32.lshift(bit32.band({c3},3),6)+{c4}) end end end; \
         return table.concat({res}) end end",
        s0 = sextets[0],
        s1 = sextets[1],
        s2 = sextets[2],
        s3 = sextets[3],
    );

    Snippet {
        text,
        entry: f,
        bindings,
    }
}

/// Repeating-key XOR decoder: `F(data, key) -> bytes`.
pub fn xor_decoder<N: NameSupply + ?Sized>(names: &mut N) -> Snippet {
    let f = names.fresh(8);
    let data = names.fresh(4);
    let key = names.fresh(3);
    let res = names.fresh(4);
    let klen = names.fresh(5);
    let i = names.fresh(1);
    let mut bindings = vec![
        f.clone(),
        data.clone(),
        key.clone(),
        res.clone(),
        klen.clone(),
        i.clone(),
    ];

    let body = match names.variant(2) {
        0 => {
            let db = names.fresh(6);
            let kb = names.fresh(5);
            bindings.push(db.clone());
            bindings.push(kb.clone());
            format!(
                "for {i}=1,#{data} do local {db}=string.byte({data},{i}); \
                 local {kb}=string.byte({key},({i}-1)%{klen}+1); \
                 {res}[{i}]=string.char(bit32.bxor({db},{kb})) end; "
            )
        }
        _ => {
            let j = names.fresh(2);
            bindings.push(j.clone());
            format!(
                "local {j}=1; for {i}=1,#{data} do \
                 {res}[#{res}+1]=\
                 string.char(bit32.bxor(string.byte({data},{i}),string.byte({key},{j}))); \
                 {j}={j}+1; if {j}>{klen} then {j}=1 end end; "
            )
        }
    };

    let text = format!(
        "local {f}; do {f}=function({data},{key}) local {res}={{}}; local {klen}=#{key}; \
         {body}return table.concat({res}) end end"
    );

    Snippet {
        text,
        entry: f,
        bindings,
    }
}

/// Additive checksum: `F(data) -> (sum of bytes) % 256`.
pub fn checksum_fn<N: NameSupply + ?Sized>(names: &mut N) -> Snippet {
    let f = names.fresh(8);
    let data = names.fresh(4);
    let sum = names.fresh(3);
    let i = names.fresh(1);
    let bindings = vec![f.clone(), data.clone(), sum.clone(), i.clone()];

    let body = match names.variant(3) {
        0 => format!(
            "local {sum}=0; for {i}=1,#{data} do {sum}=({sum}+string.byte({data},{i}))%256 end; \
             return {sum}"
        ),
        1 => format!(
            "local {sum},{i}=0,1; while {i}<=#{data} do {sum}=({sum}+string.byte({data},{i}))%256; \
             {i}={i}+1 end; return {sum}"
        ),
        _ => format!(
            "local {sum}=0; for {i}=1,#{data} do {sum}={sum}+string.byte({data},{i}) end; \
             return {sum}%256"
        ),
    };

    let text = format!("local {f}; do {f}=function({data}) {body} end end");

    Snippet {
        text,
        entry: f,
        bindings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{NameAllocator, RandomMaterial, SequentialNames};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn all_snippets<N: NameSupply>(names: &mut N) -> Vec<Snippet> {
        vec![
            base64_decoder(names),
            xor_decoder(names),
            checksum_fn(names),
        ]
    }

    #[test]
    fn test_deterministic_given_supply() {
        for variant in 0..3 {
            let a = all_snippets(&mut SequentialNames::with_variant(variant));
            let b = all_snippets(&mut SequentialNames::with_variant(variant));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_variants_differ() {
        let a = base64_decoder(&mut SequentialNames::with_variant(0));
        let b = base64_decoder(&mut SequentialNames::with_variant(1));
        assert_ne!(a.text, b.text);

        let a = xor_decoder(&mut SequentialNames::with_variant(0));
        let b = xor_decoder(&mut SequentialNames::with_variant(1));
        assert_ne!(a.text, b.text);

        let texts: HashSet<String> = (0..3)
            .map(|v| checksum_fn(&mut SequentialNames::with_variant(v)).text)
            .collect();
        assert_eq!(texts.len(), 3);
    }

    #[test]
    fn test_declaration_shape() {
        for snippet in all_snippets(&mut SequentialNames::new()) {
            assert!(snippet
                .text
                .starts_with(&format!("local {}; do ", snippet.entry)));
            assert!(snippet.text.ends_with(" end end"));
            assert_eq!(snippet.bindings[0], snippet.entry);
            for name in &snippet.bindings {
                assert!(snippet.text.contains(name.as_str()), "unused binding {}", name);
            }
        }
    }

    #[test]
    fn test_balanced_delimiters() {
        for variant in 0..3 {
            for snippet in all_snippets(&mut SequentialNames::with_variant(variant)) {
                let count = |c: char| snippet.text.chars().filter(|&x| x == c).count();
                assert_eq!(count('('), count(')'), "{}", snippet.text);
                assert_eq!(count('{'), count('}'), "{}", snippet.text);
                assert_eq!(count('['), count(']'), "{}", snippet.text);
            }
        }
    }

    #[test]
    fn test_bindings_disjoint_within_one_allocator() {
        let mut material = RandomMaterial::new(StdRng::seed_from_u64(9));
        let mut names = NameAllocator::new(&mut material);
        let mut seen = HashSet::new();
        for _ in 0..10 {
            for snippet in all_snippets(&mut names) {
                for name in snippet.bindings {
                    assert!(seen.insert(name.clone()), "name reused: {}", name);
                }
            }
        }
    }

    fn sample_inputs() -> Vec<Vec<u8>> {
        vec![
            Vec::new(),
            b"p".to_vec(),
            b"pr".to_vec(),
            b"print(1)".to_vec(),
            "print('h\u{e9}llo \u{2713}')".as_bytes().to_vec(),
            (0..=255).collect(),
        ]
    }

    /// Load the three helpers into a fresh runtime and compare each against
    /// the Rust implementation it must agree with.
    fn assert_helpers_agree<N: NameSupply>(names: &mut N) {
        use crate::cipher::xor_cycle;
        use crate::integrity::checksum;
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        use mlua::{Function, Lua};

        let b64 = base64_decoder(names);
        let xor = xor_decoder(names);
        let chk = checksum_fn(names);
        let chunk = format!(
            "{} {} {} return {}, {}, {}",
            b64.text, xor.text, chk.text, b64.entry, xor.entry, chk.entry
        );

        let lua = Lua::new();
        let (decode, unxor, sum): (Function, Function, Function) =
            lua.load(chunk.as_str()).eval().unwrap();

        for input in sample_inputs() {
            let encoded = STANDARD.encode(&input);
            let decoded: mlua::String = decode.call(encoded.as_str()).unwrap();
            assert_eq!(decoded.as_bytes(), &input[..], "base64 of {:?}", encoded);

            for key in [&b"k"[..], b"k3Y_", b"a-much-longer-key-than-most-inputs"] {
                let data = lua.create_string(&input).unwrap();
                let key_str = lua.create_string(key).unwrap();
                let out: mlua::String = unxor.call((data, key_str)).unwrap();
                assert_eq!(out.as_bytes(), &xor_cycle(&input, key).unwrap()[..]);
            }

            let data = lua.create_string(&input).unwrap();
            let total: i64 = sum.call(data).unwrap();
            assert_eq!(total, i64::from(checksum(&input)));
        }
    }

    #[test]
    fn test_helpers_match_rust_for_every_variant() {
        // Sequential supplies hit every combination of the two- and
        // three-way variant choices.
        for variant in 0..6 {
            assert_helpers_agree(&mut SequentialNames::with_variant(variant));
        }
    }

    #[test]
    fn test_helpers_match_rust_with_random_names() {
        for seed in 0..16 {
            let mut material = RandomMaterial::new(StdRng::seed_from_u64(seed));
            assert_helpers_agree(&mut NameAllocator::new(&mut material));
        }
    }

    #[test]
    fn test_random_runs_differ() {
        let mut m1 = RandomMaterial::new(StdRng::seed_from_u64(1));
        let mut m2 = RandomMaterial::new(StdRng::seed_from_u64(2));
        let a = xor_decoder(&mut NameAllocator::new(&mut m1));
        let b = xor_decoder(&mut NameAllocator::new(&mut m2));
        assert_ne!(a.text, b.text);
    }
}
