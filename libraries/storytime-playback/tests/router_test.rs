//! Integration tests for the command router

mod common;

use common::{at, events, Book};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use storytime_playback::{CommandRouter, Outcome, PlaybackError, PlaybackEvent, PlaybackState};

fn router(book: &Book) -> CommandRouter {
    CommandRouter::new(book.controller())
}

fn parse_errors(rx: &crossbeam_channel::Receiver<PlaybackEvent>) -> Vec<String> {
    rx.try_iter()
        .filter_map(|event| match event {
            PlaybackEvent::Error { message } => Some(message),
            _ => None,
        })
        .collect()
}

#[test]
fn seek_to_file_and_position() {
    let book = Book::new(&[("a.mp3", 100), ("b.mp3", 100)]);
    let router = router(&book);

    assert_eq!(router.execute("seek b.mp3 1:30").unwrap(), Outcome::Continue);
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 90));
    assert_eq!(router.controller().state(), PlaybackState::Stopped);
}

#[test]
fn filenames_may_contain_spaces() {
    let book = Book::new(&[("Chapter 01.mp3", 100), ("Chapter 02.mp3", 100)]);
    let router = router(&book);

    router.execute("play Chapter 02.mp3 0:05").unwrap();
    assert_eq!(at(router.controller()), ("Chapter 02.mp3".to_string(), 5));
    assert_eq!(router.controller().state(), PlaybackState::Playing);
}

#[test]
fn relative_seek_without_file_is_dseek() {
    let book = Book::new(&[("a.mp3", 100), ("b.mp3", 100)]);
    let router = router(&book);
    router.execute("seek b.mp3 30").unwrap();

    router.execute("seek -5").unwrap();
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 25));

    router.execute("dseek -1:00").unwrap();
    assert_eq!(at(router.controller()), ("a.mp3".to_string(), 65));

    router.execute("dseek +40").unwrap();
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 5));
}

#[test]
fn absolute_seek_without_file_stays_in_current_file() {
    let book = Book::new(&[("a.mp3", 100), ("b.mp3", 100)]);
    let router = router(&book);
    router.execute("seek b.mp3 30").unwrap();

    router.execute("seek 10").unwrap();
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 10));
}

#[test]
fn relative_play_moves_and_plays() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);
    router.execute("seek 30").unwrap();

    router.execute("play +10").unwrap();
    assert_eq!(at(router.controller()), ("a.mp3".to_string(), 40));
    assert_eq!(router.controller().state(), PlaybackState::Playing);
}

#[test]
fn pause_and_play_pause() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);

    router.execute("play").unwrap();
    router.execute("pause").unwrap();
    router.execute("play_pause").unwrap();
    router.execute("play_pause").unwrap();

    assert_eq!(
        events(router.controller()),
        vec!["start", "stop", "start", "stop"]
    );
}

#[test]
fn stepfile_moves_between_files() {
    let book = Book::new(&[("a.mp3", 100), ("b.mp3", 100), ("c.mp3", 100)]);
    let router = router(&book);

    router.execute("stepfile 2").unwrap();
    assert_eq!(at(router.controller()), ("c.mp3".to_string(), 0));
    router.execute("stepfile -1").unwrap();
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 0));
    router.execute("stepfile 7").unwrap();
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 0));
}

#[test]
fn volume_and_dvolume() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);

    router.execute("volume 2.5").unwrap();
    assert!((book.backend.volume() - 2.5).abs() < f64::EPSILON);

    router.execute("dvolume -0.5").unwrap();
    assert!((book.backend.volume() - 2.0).abs() < f64::EPSILON);

    router.execute("dvolume +20").unwrap();
    assert!((book.backend.volume() - 10.0).abs() < f64::EPSILON);
}

#[test]
fn mark_command_logs_bookmark() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);

    router.execute("mark favourite").unwrap();
    assert_eq!(events(router.controller()), vec!["favourite"]);
}

#[test]
fn quit_asks_caller_to_stop() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);

    assert_eq!(router.execute("quit").unwrap(), Outcome::Quit);
    assert_eq!(router.execute("  quit  \n").unwrap(), Outcome::Quit);
    assert!(matches!(
        router.execute("quit now"),
        Err(PlaybackError::MalformedCommand(_))
    ));
}

#[test]
fn blank_lines_are_ignored() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);
    let rx = router.controller().subscribe();

    assert_eq!(router.execute("").unwrap(), Outcome::Continue);
    assert_eq!(router.execute("   \n").unwrap(), Outcome::Continue);
    assert!(parse_errors(&rx).is_empty());
}

#[test]
fn malformed_commands_are_reported_and_change_nothing() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);
    let rx = router.controller().subscribe();

    for line in ["seek a.mp3 soon", "dseek", "stepfile one", "volume loud", "play 1:2:3:4"] {
        assert!(
            matches!(router.execute(line), Err(PlaybackError::MalformedCommand(_))),
            "{:?} should be malformed",
            line
        );
    }

    assert!(router.controller().playlog().is_empty());
    let errors = parse_errors(&rx);
    assert_eq!(errors.len(), 5);
    assert_eq!(errors[0], "Failed to parse: \"seek a.mp3 soon\"");
}

#[test]
fn unknown_verbs_are_reported() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);
    let rx = router.controller().subscribe();

    assert!(matches!(
        router.execute("rewind everything"),
        Err(PlaybackError::UnknownCommand(_))
    ));
    assert_eq!(
        parse_errors(&rx),
        vec!["Failed to parse: \"rewind everything\"".to_string()]
    );
}

#[test]
fn registered_handlers_run_under_the_controller_lock() {
    let book = Book::new(&[("a.mp3", 100), ("b.mp3", 100)]);
    let router = router(&book);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    router.register("chapter", move |session, args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let delta: i64 = args
            .first()
            .and_then(|arg| arg.parse().ok())
            .unwrap_or(1);
        session.step_file(delta)?;
        session.mark("chapter").map(|_| ())
    });

    router.execute("chapter 1").unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(at(router.controller()), ("b.mp3".to_string(), 0));
    assert_eq!(events(router.controller()), vec!["seekto", "chapter"]);
}

#[test]
fn built_in_verbs_cannot_be_overridden() {
    let book = Book::new(&[("a.mp3", 100)]);
    let router = router(&book);
    router.register("pause", |_, _| Err(PlaybackError::Backend("never".into())));

    router.execute("play").unwrap();
    router.execute("pause").unwrap();
    assert_eq!(router.controller().state(), PlaybackState::Stopped);
}

#[test]
fn commands_from_several_sources_never_interleave() {
    let book = Book::new(&[("a.mp3", 1000)]);
    let router = Arc::new(router(&book));

    let sources: Vec<_> = ["play", "pause", "seek +5"]
        .into_iter()
        .map(|line| {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                for _ in 0..20 {
                    router.execute(line).unwrap();
                }
            })
        })
        .collect();
    for source in sources {
        source.join().unwrap();
    }

    // Every seekfrom is immediately followed by its seekto
    let log = events(router.controller());
    for (i, event) in log.iter().enumerate() {
        if event == "seekfrom" {
            assert_eq!(log.get(i + 1).map(String::as_str), Some("seekto"));
        }
    }
}
