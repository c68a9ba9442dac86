// properties.rs - Randomized checks of engine-wide guarantees.

use std::ops::Range;
use std::thread;

use quickcheck::quickcheck;

use regvm::prelude::*;

/// Map arbitrary bytes onto a small alphabet so patterns actually hit.
fn abc(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b'a' + b % 3).collect()
}

const ALTERNATIVES: [&[u8]; 8] = [b"a", b"ab", b"abc", b"b", b"bca", b"c", b"cab", b"abca"];

/// Alternation over `ALTERNATIVES`, each branch captured as group 1.
fn alternation() -> Program {
    let mut b = Program::builder(&ENCODING_UTF8);
    let done = b.label();
    b.groups(1);
    for (i, alt) in ALTERNATIVES.iter().enumerate() {
        let next = b.label();
        if i + 1 < ALTERNATIVES.len() {
            b.push(next);
        }
        b.emit(Instruction::MemStartPush { num: 1 })
            .exact(alt)
            .emit(Instruction::MemEndPush { num: 1 })
            .jump(done);
        b.bind(next);
    }
    b.bind(done).emit(Instruction::End);
    b.build().unwrap()
}

/// ((?:a|ab)+)\1
fn repeated_prefix() -> Program {
    let mut b = Program::builder(&ENCODING_UTF8);
    let top = b.label();
    let second = b.label();
    let next = b.label();
    let done = b.label();
    b.groups(1).emit(Instruction::MemStartPush { num: 1 });
    b.bind(top).push(second).exact(b"a").jump(next);
    b.bind(second).exact(b"ab");
    b.bind(next).push(done).jump(top);
    b.bind(done)
        .emit(Instruction::MemEndPush { num: 1 })
        .emit(Instruction::BackRef1)
        .emit(Instruction::End);
    b.build().unwrap()
}

/// (?:(a+)b|(a+)c)
fn either_run() -> Program {
    let mut b = Program::builder(&ENCODING_UTF8);
    let second = b.label();
    let done = b.label();
    let (l1, e1, l2, e2) = (b.label(), b.label(), b.label(), b.label());
    b.groups(2).push(second).emit(Instruction::MemStartPush { num: 1 });
    b.bind(l1).exact(b"a").push(e1).jump(l1);
    b.bind(e1)
        .emit(Instruction::MemEndPush { num: 1 })
        .exact(b"b")
        .jump(done);
    b.bind(second).emit(Instruction::MemStartPush { num: 2 });
    b.bind(l2).exact(b"a").push(e2).jump(l2);
    b.bind(e2).emit(Instruction::MemEndPush { num: 2 }).exact(b"c");
    b.bind(done).emit(Instruction::End);
    b.build().unwrap()
}

fn zero_width(which: u8) -> Instruction {
    match which % 7 {
        0 => Instruction::BeginBuf,
        1 => Instruction::EndBuf,
        2 => Instruction::BeginLine,
        3 => Instruction::EndLine,
        4 => Instruction::WordBound,
        5 => Instruction::NotWordBound,
        _ => Instruction::WordBegin,
    }
}

/// (?:X)* for a zero-width X, guarded by a null check.
fn empty_loop(body: Instruction) -> Program {
    let mut b = Program::builder(&ENCODING_UTF8);
    let top = b.label();
    let exit = b.label();
    let id = b.null_check();
    b.bind(top)
        .push(exit)
        .emit(Instruction::NullCheckStart { id })
        .emit(body)
        .emit(Instruction::NullCheckEnd { id })
        .jump(top);
    b.bind(exit).emit(Instruction::End);
    b.build().unwrap()
}

/// (?:(a*)b|(a*)c){lower,upper}, the body under a null check.
fn captured_repeat(lower: u32, upper: u32, greedy: bool, direct: bool) -> Program {
    let mut b = Program::builder(&ENCODING_UTF8);
    let id = b.repeat_range(lower, upper);
    let check = b.null_check();
    let exit = b.label();
    let second = b.label();
    let body_end = b.label();
    let (l1, e1, l2, e2) = (b.label(), b.label(), b.label(), b.label());
    b.groups(2);
    if greedy {
        b.repeat(id, exit);
    } else {
        b.repeat_ng(id, exit);
    }
    b.emit(Instruction::NullCheckStart { id: check })
        .push(second)
        .emit(Instruction::MemStartPush { num: 1 });
    b.bind(l1).push(e1).exact(b"a").jump(l1);
    b.bind(e1)
        .emit(Instruction::MemEndPush { num: 1 })
        .exact(b"b")
        .jump(body_end);
    b.bind(second).emit(Instruction::MemStartPush { num: 2 });
    b.bind(l2).push(e2).exact(b"a").jump(l2);
    b.bind(e2).emit(Instruction::MemEndPush { num: 2 }).exact(b"c");
    b.bind(body_end)
        .emit(Instruction::NullCheckEnd { id: check })
        .emit(match (greedy, direct) {
            (true, false) => Instruction::RepeatInc { id },
            (true, true) => Instruction::RepeatIncSg { id },
            (false, false) => Instruction::RepeatIncNg { id },
            (false, true) => Instruction::RepeatIncNgSg { id },
        });
    b.bind(exit).emit(Instruction::End);
    b.build().unwrap()
}

type Groups = [Option<Range<usize>>; 2];

/// What `captured_repeat` must report. Each iteration has at most one way to
/// succeed, and a failed iteration leaves the groups of the previous one.
fn captured_repeat_reference(
    text: &[u8],
    lower: u32,
    upper: u32,
    greedy: bool,
) -> Option<(usize, Groups)> {
    let want = if greedy { upper } else { lower };
    let mut pos = 0;
    let mut count = 0;
    let mut groups: Groups = [None, None];
    while count < want {
        let q = pos + text[pos..].iter().take_while(|&&c| c == b'a').count();
        let slot = match text.get(q) {
            Some(b'b') => 0,
            Some(b'c') => 1,
            _ => break,
        };
        groups[slot] = Some(pos..q);
        pos = q + 1;
        count += 1;
    }
    (count >= lower).then_some((pos, groups))
}

quickcheck! {
    fn runs_are_deterministic(text: Vec<u8>, other: Vec<u8>) -> bool {
        let text = abc(&text);
        let other = abc(&other);
        let p = repeated_prefix();

        let fresh = MatchEngine::new(&p).run(&Input::new(&text));
        let mut reused = MatchEngine::new(&p);
        let _ = reused.run(&Input::new(&other));
        let again = reused.run(&Input::new(&text));
        fresh == again && fresh.is_ok()
    }

    fn failed_branch_leaves_no_captures(n: u8, ends_with_b: bool) -> bool {
        let n = (n % 30) as usize + 1;
        let mut text = vec![b'a'; n];
        text.push(if ends_with_b { b'b' } else { b'c' });

        let region = match MatchEngine::new(&either_run()).run(&Input::new(&text)) {
            Ok(MatchOutcome::Matched(region)) => region,
            _ => return false,
        };
        let (taken, dropped) = if ends_with_b { (1, 2) } else { (2, 1) };
        region.pos(0) == Some(0..n + 1)
            && region.pos(taken) == Some(0..n)
            && region.pos(dropped).is_none()
    }

    fn find_longest_picks_longest_alternative(text: Vec<u8>) -> bool {
        let text = abc(&text);
        let p = alternation();
        let config = MatchConfig::default().options(MatchOptions::FIND_LONGEST);
        let region = match MatchEngine::with_config(&p, config).run(&Input::new(&text)) {
            Ok(outcome) => outcome.into_region(),
            Err(_) => return false,
        };
        let longest = ALTERNATIVES
            .iter()
            .filter(|alt| text.starts_with(alt))
            .map(|alt| alt.len())
            .max();
        match longest {
            Some(len) => {
                region.map_or(false, |r| r.pos(0) == Some(0..len) && r.pos(1) == Some(0..len))
            }
            None => region.is_none(),
        }
    }

    fn first_match_picks_first_alternative(text: Vec<u8>) -> bool {
        let text = abc(&text);
        let p = alternation();
        let region = match MatchEngine::new(&p).run(&Input::new(&text)) {
            Ok(outcome) => outcome.into_region(),
            Err(_) => return false,
        };
        let first = ALTERNATIVES.iter().find(|alt| text.starts_with(alt)).map(|alt| alt.len());
        region.and_then(|r| r.pos(0)) == first.map(|len| 0..len)
    }

    fn repeat_captures_match_reference(
        text: Vec<u8>,
        lower: u8,
        extra: u8,
        unbounded: bool,
        greedy: bool,
        direct: bool
    ) -> bool {
        let text: Vec<u8> = text.iter().map(|b| b'a' + b % 4).collect();
        let lower = (lower % 3) as u32;
        let upper = if unbounded { INFINITE_REPEAT } else { lower.max(1) + (extra % 3) as u32 };
        let p = captured_repeat(lower, upper, greedy, direct);

        let got = match MatchEngine::new(&p).run(&Input::new(&text)) {
            Ok(outcome) => outcome.into_region(),
            Err(_) => return false,
        };
        match (got, captured_repeat_reference(&text, lower, upper, greedy)) {
            (Some(region), Some((end, groups))) => {
                region.pos(0) == Some(0..end)
                    && region.pos(1) == groups[0]
                    && region.pos(2) == groups[1]
            }
            (None, None) => true,
            _ => false,
        }
    }

    fn empty_loops_terminate(text: String, which: u8, start: u8) -> bool {
        let text = text.into_bytes();
        let start = (start as usize).min(text.len());
        if std::str::from_utf8(&text[start..]).is_err() {
            // Not a character boundary.
            return true;
        }
        let p = empty_loop(zero_width(which));
        let out = MatchEngine::new(&p).run(&Input::new(&text).span(start, text.len()));
        match out {
            Ok(MatchOutcome::Matched(region)) => region.pos(0) == Some(start..start),
            _ => false,
        }
    }
}

#[test]
fn program_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Program>();

    let p = captured_repeat(1, INFINITE_REPEAT, true, false);
    let texts: Vec<&[u8]> = vec![b"ab", b"aacabd", b"bcbcbc", b"d", b"aaab", b"ac"];
    let expected: Vec<_> = texts.iter().map(|t| MatchEngine::new(&p).run(&Input::new(t))).collect();

    thread::scope(|scope| {
        let mut workers = Vec::new();
        for _ in 0..4 {
            workers.push(scope.spawn(|| {
                let mut engine = MatchEngine::new(&p);
                let mut got = Vec::new();
                for _ in 0..50 {
                    for t in &texts {
                        got.push(engine.run(&Input::new(t)));
                    }
                }
                got
            }));
        }
        for worker in workers {
            let got = worker.join().unwrap();
            for chunk in got.chunks(texts.len()) {
                assert_eq!(chunk, &expected[..]);
            }
        }
    });
}
