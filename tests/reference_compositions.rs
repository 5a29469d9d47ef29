//! End-to-end checks against published compositions with known themes.

use popeye_themes::{analyze_entry, AnalysisConfig, FactSet, ProblemEntry};
use serde_json::json;

fn entry(value: serde_json::Value) -> ProblemEntry {
    serde_json::from_value(value).expect("reference entry is well formed")
}

fn analyze(value: serde_json::Value) -> FactSet {
    analyze_entry(&entry(value), &AnalysisConfig::default()).expect("reference entry analyzes")
}

#[test]
fn test_cyclic_place_exchange_of_neutral_queens() {
    let facts = analyze(json!({
        "stipulation": "ser-h~4",
        "algebraic": {"neutral": ["Qa8", "Qa7", "Qb7"]},
        "solution": "1.nQa7-b8 nQa8-a7 2.nQb7-a8 nQb8-b7"
    }));
    assert_eq!(facts.count("PW(3)"), 1);
    assert_eq!(facts.count("PWPiece(nQ)"), 3);
}

#[test]
fn test_king_rook_place_exchange() {
    let facts = analyze(json!({
        "stipulation": "#4",
        "algebraic": {"white": ["Kh8", "Rg8", "Bc6", "Pe5"], "black": ["Ke7", "Pe6", "Pc7"]},
        "solution": "1.Kh8-h7 ! zugzwang.
              1...Ke7-f7
                  2.Rg8-h8 zugzwang.
                      2...Kf7-e7
                          3.Kh7-g8 zugzwang.
                              3...Ke7-d8
                                  4.Kg8-f7 #"
    }));
    assert!(facts.contains("PW(2)"));
    assert!(facts.contains("PWPiece(wK)"));
    assert!(facts.contains("PWPiece(wR)"));
}

#[test]
fn test_corner_to_corner() {
    let facts = analyze(json!({
        "stipulation": "h#8",
        "algebraic": {
            "white": ["Ka1", "Pg2", "Pe2"],
            "black": ["Kc1", "Rc4", "Bf4", "Ba6", "Sd5", "Sb6", "Pg3", "Pf5", "Pe5", "Pe3", "Pb3", "Pa3"]
        },
        "solution": "1.Kc1-d2 Ka1-b1 2.Kd2-c3 Kb1-c1 3.Kc3-d4+ Kc1-d1 4.Kd4-e4 Kd1-e1 {\n} 5.Rc4-d4 Ke1-f1 6.Sb6-c4 Kf1-g1 7.Sc4-d2 Kg1-h1 8.Sd2-f3 g2*f3#"
    }));
    assert!(facts.contains("CornerToCorner(wK)"));
}

#[test]
fn test_double_albino() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "algebraic": {
            "white": ["Kc6", "Qb5", "Rd1", "Bb6", "Ph2", "Pg2", "Pd2", "Pb2"],
            "black": ["Ke5", "Qb4", "Rb7", "Ra6", "Ba4", "Sc5", "Sc3", "Ph3", "Pf6", "Pf3", "Pe6", "Pe3", "Pb3"]
        },
        "solution": "1.Qb4-f4 g2-g4   2.Sc3-e4 d2-d4 #
            1.Ke5-d4 g2*f3   2.e6-e5 d2*c3 #
            1.Ke5-f4 g2*h3   2.Sc5-e4 d2*e3 #
            1.Ke5-e4 g2-g3   2.Sc5-d7 d2-d3 #"
    }));
    assert_eq!(facts.count("Albino(wP)"), 2);
}

#[test]
fn test_long_traceback_with_capture() {
    let facts = analyze(json!({
        "stipulation": "h#9",
        "algebraic": {"white": ["Ka6", "Bb2"], "black": ["Ka8", "Qb3", "Sc3", "Pe5"]},
        "solution": "1.Qb3-b8 Ka6-a5   2.Ka8-b7 Bb2-a3   3.Kb7-c6 Ba3-d6   4.Kc6-d5 Bd6*b8  {
            } 5.Kd5-c4 Bb8-d6   6.Kc4-b3 Bd6-a3   7.Kb3-a2 Ka5-b4   8.Ka2-a1 Kb4-b3  {
            } 9.Sc3-b1 Ba3-b2 #"
    }));
    assert!(facts.contains("TraceBack(wB, 3, true)"));
}

#[test]
fn test_closed_walk_with_nested_cycle() {
    let facts = analyze(json!({
        "stipulation": "h#9",
        "algebraic": {
            "white": ["Kh1", "Bh5", "Be1", "Pg6", "Pg5", "Pg4", "Pf2", "Pe3", "Pc3"],
            "black": ["Kh3", "Ph4", "Pg7", "Pf3", "Pe4", "Pc6", "Pc4", "Pa7"]
        },
        "solution": "1.a7-a5 Be1-d2   2.a5-a4 Bd2-c1   3.a4-a3 Bc1-b2   4.a3-a2 Bb2-a3
            5.a2-a1=R + Ba3-c1   6.Ra1-a2 Kh1-g1   7.Ra2*f2 Bc1-d2   8.Kh3-g3 Bd2-e1
            9.h4-h3 Be1*f2 #"
    }));
    assert!(facts.contains("ClosedWalk(wB, 7, false)"));
    assert!(facts.contains("LinearCycle(wB, 3, false)"));
    assert!(facts.contains("TraceBack(bP, 1, false)"));
}

#[test]
fn test_switchbacks() {
    let facts = analyze(json!({
        "stipulation": "ser-~3",
        "algebraic": {"white": ["Ba1", "Bh1"]},
        "solution": "1.Ba1-h8 2.Bh8-a1 3.Ba1-h8 4.Bh8-a1"
    }));
    assert_eq!(facts.count("TraceBack(wB, 2, false)"), 1);
    assert_eq!(facts.count("CornerToCorner(wB)"), 4);
}

#[test]
fn test_twins_and_set_play_phases() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "options": ["SetPlay"],
        "algebraic": {"white": ["Kh1", "Rh4", "Rc1"], "black": ["Kd2", "Pe3", "Pe2"]},
        "twins": {"b": "Move h4 g1", "c": "Move h4 h3"},
        "solution": "a) 1...Rc1-c4   2.Kd2-d3 Rh4-d4 #
          1.e2-e1=S Rh4-c4   2.Se1-d3 Rc4-c2 #
          b) wRh4-->g1 1.e2-e1=R Rg1-f1   2.Re1-e2 Rf1-d1 #
          c) wRh4-->h3 1.e2-e1=B Rc1-c3   2.e3-e2 Rh3-d3 #"
    }));
    assert_eq!(facts.count("Twins"), 3);
    assert_eq!(facts.count("Phases"), 4);
}

#[test]
fn test_set_play_phases() {
    let direct = analyze(json!({
        "stipulation": "#2",
        "algebraic": {"white": ["Kc6", "Qf3", "Sb5", "Pa3"], "black": ["Kc4", "Se4", "Pd4"]},
        "solution": "1...d4-d3 2.Qf3-f7 #
          1...Se4-f2 {(S~)} 2.Sb5-d6 # {(A)}
           but 1...Se4-c3 !

          1.Qf3-d1 ! zugzwang.
             1...d4-d3  2.Qd1-a4 #
             1...Se4-f2  {(S~)} 2.Qd1-c2 #
             1...Se4-c3 2.Sb5-d6 # {(A)}"
    }));
    assert_eq!(direct.count("Phases"), 2);

    let help = analyze(json!({
        "stipulation": "h#2.5",
        "algebraic": {
            "black": ["Ph5", "Sa5", "Rh6", "Ke6", "Ph7", "Rb7", "Qf8", "Bd8"],
            "white": ["Re2", "Pd3", "Pf4", "Be4", "Be5", "Ka6"]
        },
        "solution": "1...Be5-a1   2.Qf8*f4 Re2-b2   3.Ke6-e5 + Rb2-b6 # \n1...Be5-h8   2.Bd8-f6 f4-f5 +   3.Ke6-f7 Be4-d5 # \n1...Be4-h1   2.Qf8-c5 Re2-g2   3.Ke6-d5 + Rg2-g6 # \n1...Re2-g2   2.Bd8-b6 Be4-d5 +   3.Ke6-f5 Rg2-g5 #"
    }));
    assert_eq!(help.count("Phases"), 4);
}

#[test]
fn test_zilahi_five_lines() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "algebraic": {
            "white": ["Kb2", "Rb7", "Be5", "Bb3", "Sf3", "Sd3"],
            "black": ["Kc6", "Re3", "Sa5", "Pf6", "Pe4", "Pa6"]
        },
        "solution": "1.Re3*f3 Bb3-d1   2.e4-e3 Bd1*f3 #
            1.e4*d3 Rb7-b6 +   2.Kc6-c5 Be5-d4 #
            1.Sa5*b3 Rb7-c7 +   2.Kc6-d5 Sd3-f4 #
            1.Sa5*b7 Be5-c7   2.Kc6-b5 Sf3-d4 #
            1.f6*e5 Sf3*e5 +   2.Kc6-d6 Rb7-d7 #"
    }));
    assert!(facts.contains("Zilahi(5)"));
    assert_eq!(facts.count("ZilahiPiece(wR, true)"), 1);
    assert_eq!(facts.count("ZilahiPiece(wB, true)"), 2);
    assert_eq!(facts.count("ZilahiPiece(wS, true)"), 2);
}

#[test]
fn test_zilahi_three_by_two() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "algebraic": {
            "white": ["Ka3", "Rb7", "Ra5", "Bd2", "Ba2", "Sd4", "Pg5", "Pf4", "Pd5", "Pb5", "Pa6"],
            "black": ["Kd6", "Qc3", "Rc2", "Ra1", "Sc1", "Sb3", "Pg6", "Pf6", "Pc5", "Pa4"]
        },
        "solution": "1.Qc3*d2 b5-b6 {(a7?)} 2.Sb3*a5 Sd4-b5 #
          1.Qc3*d4 a6-a7 {(f5?)} 2.Sb3*d2 Ra5-a6 #
          1.Qc3*a5 f4-f5 {(b6?)} 2.Sb3*d4 Bd2-f4 #"
    }));
    assert_eq!(facts.count("Zilahi(3)"), 2);
    assert_eq!(facts.count("Zilahi(2)"), 3);
    assert_eq!(facts.count("ZilahiPiece(wR, true)"), 4);
    assert_eq!(facts.count("ZilahiPiece(wB, true)"), 4);
    assert_eq!(facts.count("ZilahiPiece(wS, true)"), 4);
}

#[test]
fn test_zilahi_across_twins() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "intended-solutions": "2",
        "algebraic": {
            "white": ["Ka2", "Rh1", "Bg8", "Sf6", "Sd4", "Pe6"],
            "black": ["Ke5", "Qc8", "Re8", "Bd6", "Bb5", "Sg7", "Ph5", "Pf5", "Pf4", "Pe4", "Pd7", "Pc3"]
        },
        "twins": {"b": "Move h1 a5"},
        "solution": "a)
          1.Sg7*e6 Rh1*h5   2.Se6*d4 Sf6-g4 #
          1.Re8*e6 Rh1-e1   2.Re6*f6 Sd4-f3 #

          b) wRh1-->a5
          1.Qc8-c5 e6-e7   2.Qc5*d4 Sf6*d7 #
          1.Qc8-d8 e6*d7   2.Qd8*f6 Sd4-c6 #"
    }));
    assert_eq!(facts.count("Zilahi(2)"), 4);
    assert_eq!(facts.count("Twins"), 2);
}

#[test]
fn test_zilahi_pawns() {
    let facts = analyze(json!({
        "stipulation": "h#5.5",
        "algebraic": {"white": ["Kd8", "Ph2", "Pf2"], "black": ["Kd5", "Rd2"]},
        "solution": "1...f2-f4   2.Rd2*h2 f4-f5  3.Kd5-e4 f5-f6 4.Ke4-f3 f6-f7 5.Kf3-g2 f7-f8=Q   6.Kg2-h1 Qf8-f1 #
          1...h2-h3   2.Rd2*f2 h3-h4   3.Kd5-e6 h4-h5   4.Ke6-f7 h5-h6   5.Kf7-f8 h6-h7   6.Rf2-f7 h7-h8=Q #"
    }));
    assert_eq!(facts.count("ZilahiPiece(wP, true)"), 2);
}

#[test]
fn test_non_cyclic_zilahi_piece() {
    let facts = analyze(json!({
        "stipulation": "h#2",
        "algebraic": {
            "white": ["Ke1", "Ra5", "Bg5", "Se2", "Pf2"],
            "black": ["Ke4", "Bd8", "Sg4", "Pg6", "Pe6", "Pb4"]
        },
        "twins": {"b": "Remove b4"},
        "solution": "a) 1.Bd8*a5 f2-f4   2.Ke4-f5 Se2-g3 #
          b) -bPb4 1.Bd8*g5 f2-f3 +   2.Ke4-e3 Ra5-a3 #"
    }));
    assert!(facts.contains("ZilahiPiece(wR, true)"));
}

#[test]
fn test_fairy_and_twin_entries_analyze_cleanly() {
    let entries = [
        json!({
            "stipulation": "#2",
            "algebraic": {"white": ["Ke2", "Qh1", "Sd5", "Pe6"], "black": ["Ke8", "Rh8", "Sh7"]},
            "solution": "1...Sh7-g5
                  2.Qh1*h8 #

           1.Qh1-a1 ! threat:
                  2.Qa1-a8 #
              1...Ke8-d8
                  2.Qa1-a8 #
              1...0-0
                  2.Sd5-e7 #
              1...Ke8-f8
                  2.Qa1*h8 #"
        }),
        json!({
            "stipulation": "#2",
            "algebraic": {
                "white": ["Kg1", "Qc7", "Rf5", "Rf3", "Bc8", "Bc1", "Sg5", "Sd6", "Pc5", "Pb3", "Pb2"],
                "black": ["Kd4", "Rb8", "Bh1", "Bf4", "Sg7", "Sg6", "Pg3", "Pe7", "Pd5", "Pd3", "Pa3"]
            },
            "twins": {"b": "Move g1 a1 move e7 b4"},
            "solution": "a)
              1.Bc8-e6 ! threat:
                    2.Rf5*d5 #
                1...Sg6-e5  {(A)} 2.Rf5*f4 #
                1...Bh1*f3  {(B)} 2.Sg5*f3 #
                1...Sg7*f5  {(C)} 2.Sd6*f5 #
                1...a3*b2   {(D)} 2.Bc1*b2 #
                1...Bf4-e3 +{(E)} 2.Bc1*e3 #

          b) wKg1-->a1  bPe7-->b4

            1.Bc8-a6 ! threat:
                    2.Rf3*d3 #
                1...Sg6-e5  {(B)} 2.Rf5*f4 #
                1...Bh1*f3  {(C)} 2.Sg5*f3 #
                1...Sg7*f5  {(D)} 2.Sd6*f5 #
                1...a3*b2 + {(E)} 2.Bc1*b2 #
                1...Bf4-e3  {(A)} 2.Bc1*e3 #"
        }),
        json!({
            "stipulation": "#2",
            "algebraic": {"white": ["Ke5", "Ph7", "Pb7"], "black": ["Ke8"]},
            "solution": "1.Ke5-e6 ! threat:
                 2.h7-h8=Q #
                 2.h7-h8=R #
                 2.b7-b8=Q #
                 2.b7-b8=R #
             1...Ke8-d8
                 2.b7-b8=Q #
             1...Ke8-f8
                 2.h7-h8=Q #"
        }),
        json!({
            "stipulation": "#1",
            "algebraic": {"white": ["Kh5", "Rh8"]},
            "solution": "a)\n1.Kh5-g5 #\nb) rotate 270\n1.0-0 #"
        }),
        json!({
            "stipulation": "h#1",
            "algebraic": {"white": ["Pc4"], "black": ["Kc3"]},
            "solution": "1.Kc3*c4[bKc4->e8] "
        }),
        json!({
            "stipulation": "#1",
            "algebraic": {"white": ["25a1"]},
            "solution": "1...25a1-c6 "
        }),
        json!({
            "stipulation": "reci-h#3",
            "algebraic": {
                "white": ["Pe4", "Pa2", "Ra1", "Bb1", "Ke1"],
                "black": ["Bc6", "Pg4", "Pa3", "Pe3", "Qg2", "Kh1"]
            },
            "solution": "1.Qg2*a2 Ke1-f1   2.Qa2-b3 Ra1-a2   3.Bc6*e4 Bb1*e4 #\n1.Qg2*a2 Ke1-f1   2.Qa2-b3 Ra1-a2   3.Qb3-d1 #\n1.Bc6*e4 Bb1*e4   2.Kh1-h2 0-0-0   3.Qg2-g3 Rd1-h1 #\n1.Bc6*e4 Bb1*e4   2.Kh1-h2 0-0-0   3.Qg2-b2 #\n"
        }),
    ];
    for value in entries {
        let e = entry(value);
        if let Err(err) = analyze_entry(&e, &AnalysisConfig::default()) {
            panic!("{} failed: {}", e.stipulation, err);
        }
    }
}

#[test]
fn test_rebirth_at_arrival_is_semantic_error() {
    let e = entry(json!({
        "stipulation": "h#3",
        "algebraic": {"white": ["Bf2"], "black": ["Bd4", "Pe3"]},
        "solution": "1.e3*f2[+wPf2][+wBd2] f2-f4 2.Bd4-g7"
    }));
    let err = analyze_entry(&e, &AnalysisConfig::default()).unwrap_err();
    assert!(err.is_semantic_error());
    assert!(err.to_string().contains("rebirth at arrival square f2"));
}

#[test]
fn test_notation_errors() {
    let e = entry(json!({
        "stipulation": "#2",
        "algebraic": {"white": ["Ka1"]},
        "solution": "1.Ka1-b2 %"
    }));
    assert!(analyze_entry(&e, &AnalysisConfig::default())
        .unwrap_err()
        .is_notation_error());

    let e = entry(json!({
        "stipulation": "#2",
        "algebraic": {"white": ["Ka1"]},
        "solution": "1.Ka1 b2"
    }));
    assert!(analyze_entry(&e, &AnalysisConfig::default())
        .unwrap_err()
        .is_notation_error());
}

#[test]
fn test_bad_piece_declaration() {
    let e = entry(json!({
        "stipulation": "#2",
        "algebraic": {"white": ["Ka1", "Qa1"]},
        "solution": "1.Ka1-b2"
    }));
    let err = analyze_entry(&e, &AnalysisConfig::default()).unwrap_err();
    assert!(!err.is_notation_error());
    assert!(err.to_string().contains("a1"));
}

#[test]
fn test_facts_do_not_depend_on_line_order() {
    let lines = [
        "1.Re3*f3 Bb3-d1   2.e4-e3 Bd1*f3 #",
        "1.e4*d3 Rb7-b6 +   2.Kc6-c5 Be5-d4 #",
        "1.Sa5*b3 Rb7-c7 +   2.Kc6-d5 Sd3-f4 #",
        "1.Sa5*b7 Be5-c7   2.Kc6-b5 Sf3-d4 #",
        "1.f6*e5 Sf3*e5 +   2.Kc6-d6 Rb7-d7 #",
    ];
    let with_order = |order: &[usize]| {
        let solution: Vec<&str> = order.iter().map(|&i| lines[i]).collect();
        analyze(json!({
            "stipulation": "h#2",
            "algebraic": {
                "white": ["Kb2", "Rb7", "Be5", "Bb3", "Sf3", "Sd3"],
                "black": ["Kc6", "Re3", "Sa5", "Pf6", "Pe4", "Pa6"]
            },
            "solution": solution.join("\n")
        }))
    };
    let original = with_order(&[0, 1, 2, 3, 4]);
    assert!(original.contains("Zilahi(5)"));
    assert_eq!(original, with_order(&[4, 3, 2, 1, 0]));
    assert_eq!(original, with_order(&[2, 0, 4, 1, 3]));
}

#[test]
fn test_tries_excluded_from_keyplay() {
    let e = entry(json!({
        "stipulation": "#2",
        "algebraic": {"white": ["Kc1", "Ra1"], "black": ["Ke5"]},
        "solution": "1.Ra1-h1 ? but 1...Ke5-d5 !
            1.Ra1-a5 +
                1...Ke5-d4 2.Ra5-d5 #"
    }));
    let all = analyze_entry(&e, &AnalysisConfig::default()).expect("entry analyzes");
    assert!(all.contains("CornerToCorner(wR)"));

    let keyplay = AnalysisConfig {
        include_tries: false,
        ..AnalysisConfig::default()
    };
    let facts = analyze_entry(&e, &keyplay).expect("entry analyzes");
    assert!(!facts.contains("CornerToCorner(wR)"));
    assert_eq!(facts.count("Twins"), 1);
}

#[test]
fn test_castling_with_suffixes() {
    let stalemate = analyze(json!({
        "stipulation": "h=1",
        "algebraic": {"white": ["Ke1", "Rh1"], "black": ["Ke8"]},
        "solution": "1.Ke8-f8 0-0 ="
    }));
    assert_eq!(stalemate.count("Twins"), 1);

    let imitator = analyze(json!({
        "stipulation": "h#1",
        "algebraic": {"white": ["Ke1", "Rh1"], "black": ["Kh8"]},
        "solution": "1.Kh8-g8 0-0[Ia1]"
    }));
    assert_eq!(imitator.count("Twins"), 1);
}
