use phf::phf_map;

static SYMBOLS_BY_NUMBER: phf::Map<u8, &'static str> = phf_map! {
    1u8 => "H",
    2u8 => "He",
    3u8 => "Li",
    4u8 => "Be",
    5u8 => "B",
    6u8 => "C",
    7u8 => "N",
    8u8 => "O",
    9u8 => "F",
    10u8 => "Ne",
    11u8 => "Na",
    12u8 => "Mg",
    13u8 => "Al",
    14u8 => "Si",
    15u8 => "P",
    16u8 => "S",
    17u8 => "Cl",
    18u8 => "Ar",
    19u8 => "K",
    20u8 => "Ca",
    21u8 => "Sc",
    22u8 => "Ti",
    23u8 => "V",
    24u8 => "Cr",
    25u8 => "Mn",
    26u8 => "Fe",
    27u8 => "Co",
    28u8 => "Ni",
    29u8 => "Cu",
    30u8 => "Zn",
    31u8 => "Ga",
    32u8 => "Ge",
    33u8 => "As",
    34u8 => "Se",
    35u8 => "Br",
    36u8 => "Kr",
    37u8 => "Rb",
    38u8 => "Sr",
    39u8 => "Y",
    40u8 => "Zr",
    41u8 => "Nb",
    42u8 => "Mo",
    43u8 => "Tc",
    44u8 => "Ru",
    45u8 => "Rh",
    46u8 => "Pd",
    47u8 => "Ag",
    48u8 => "Cd",
    49u8 => "In",
    50u8 => "Sn",
    51u8 => "Sb",
    52u8 => "Te",
    53u8 => "I",
    54u8 => "Xe",
    55u8 => "Cs",
    56u8 => "Ba",
    57u8 => "La",
    58u8 => "Ce",
    59u8 => "Pr",
    60u8 => "Nd",
    61u8 => "Pm",
    62u8 => "Sm",
    63u8 => "Eu",
    64u8 => "Gd",
    65u8 => "Tb",
    66u8 => "Dy",
    67u8 => "Ho",
    68u8 => "Er",
    69u8 => "Tm",
    70u8 => "Yb",
    71u8 => "Lu",
    72u8 => "Hf",
    73u8 => "Ta",
    74u8 => "W",
    75u8 => "Re",
    76u8 => "Os",
    77u8 => "Ir",
    78u8 => "Pt",
    79u8 => "Au",
    80u8 => "Hg",
    81u8 => "Tl",
    82u8 => "Pb",
    83u8 => "Bi",
    84u8 => "Po",
    85u8 => "At",
    86u8 => "Rn",
    87u8 => "Fr",
    88u8 => "Ra",
    89u8 => "Ac",
    90u8 => "Th",
    91u8 => "Pa",
    92u8 => "U",
    93u8 => "Np",
    94u8 => "Pu",
};

static NUMBERS_BY_SYMBOL: phf::Map<&'static str, u8> = phf_map! {
    "H" => 1u8,
    "He" => 2u8,
    "Li" => 3u8,
    "Be" => 4u8,
    "B" => 5u8,
    "C" => 6u8,
    "N" => 7u8,
    "O" => 8u8,
    "F" => 9u8,
    "Ne" => 10u8,
    "Na" => 11u8,
    "Mg" => 12u8,
    "Al" => 13u8,
    "Si" => 14u8,
    "P" => 15u8,
    "S" => 16u8,
    "Cl" => 17u8,
    "Ar" => 18u8,
    "K" => 19u8,
    "Ca" => 20u8,
    "Sc" => 21u8,
    "Ti" => 22u8,
    "V" => 23u8,
    "Cr" => 24u8,
    "Mn" => 25u8,
    "Fe" => 26u8,
    "Co" => 27u8,
    "Ni" => 28u8,
    "Cu" => 29u8,
    "Zn" => 30u8,
    "Ga" => 31u8,
    "Ge" => 32u8,
    "As" => 33u8,
    "Se" => 34u8,
    "Br" => 35u8,
    "Kr" => 36u8,
    "Rb" => 37u8,
    "Sr" => 38u8,
    "Y" => 39u8,
    "Zr" => 40u8,
    "Nb" => 41u8,
    "Mo" => 42u8,
    "Tc" => 43u8,
    "Ru" => 44u8,
    "Rh" => 45u8,
    "Pd" => 46u8,
    "Ag" => 47u8,
    "Cd" => 48u8,
    "In" => 49u8,
    "Sn" => 50u8,
    "Sb" => 51u8,
    "Te" => 52u8,
    "I" => 53u8,
    "Xe" => 54u8,
    "Cs" => 55u8,
    "Ba" => 56u8,
    "La" => 57u8,
    "Ce" => 58u8,
    "Pr" => 59u8,
    "Nd" => 60u8,
    "Pm" => 61u8,
    "Sm" => 62u8,
    "Eu" => 63u8,
    "Gd" => 64u8,
    "Tb" => 65u8,
    "Dy" => 66u8,
    "Ho" => 67u8,
    "Er" => 68u8,
    "Tm" => 69u8,
    "Yb" => 70u8,
    "Lu" => 71u8,
    "Hf" => 72u8,
    "Ta" => 73u8,
    "W" => 74u8,
    "Re" => 75u8,
    "Os" => 76u8,
    "Ir" => 77u8,
    "Pt" => 78u8,
    "Au" => 79u8,
    "Hg" => 80u8,
    "Tl" => 81u8,
    "Pb" => 82u8,
    "Bi" => 83u8,
    "Po" => 84u8,
    "At" => 85u8,
    "Rn" => 86u8,
    "Fr" => 87u8,
    "Ra" => 88u8,
    "Ac" => 89u8,
    "Th" => 90u8,
    "Pa" => 91u8,
    "U" => 92u8,
    "Np" => 93u8,
    "Pu" => 94u8,
};

/// Returns the element symbol for an atomic number, if known.
pub fn symbol(atomic_number: u8) -> Option<&'static str> {
    SYMBOLS_BY_NUMBER.get(&atomic_number).copied()
}

/// Returns the atomic number for a correctly capitalised element symbol.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    NUMBERS_BY_SYMBOL.get(symbol).copied()
}

/// Extracts an element symbol from a crystallographic label or typed symbol.
///
/// Labels such as `H12`, `O2-` or `fe3+` are reduced to their leading alphabetic
/// characters and re-capitalised (`H`, `O`, `Fe`). Two-letter prefixes that are not
/// a known element fall back to their first letter, so `Ha1` becomes `H`.
pub fn normalize_symbol(label: &str) -> Option<String> {
    let letters: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect();
    let mut chars = letters.chars();
    let first = chars.next()?.to_ascii_uppercase();
    let candidate: String = std::iter::once(first)
        .chain(chars.map(|c| c.to_ascii_lowercase()))
        .collect();
    if atomic_number(&candidate).is_some() {
        return Some(candidate);
    }
    let single = first.to_string();
    atomic_number(&single).map(|_| single)
}
