//! Chapter position derivation
//!
//! Maps elapsed playback time to the active chapter of a track. The chapter
//! table is sorted by start time (see `Track::validated`), so resolution is a
//! binary search for the last chapter starting at or before the time.
//!
//! Callers detect chapter boundary crossings by comparing the resolved
//! number against the previous one.

use sravana_common::Chapter;

/// Chapter number reported when a track defines no chapters
pub const NO_CHAPTERS_SENTINEL: u32 = 1;

/// Within this many seconds of a chapter start, "previous chapter" moves to
/// the prior chapter instead of restarting the current one
pub const PREVIOUS_CHAPTER_RESTART_SECONDS: f64 = 3.0;

/// Resolve the chapter active at `time_seconds`
///
/// - the last chapter whose start is <= time
/// - the first chapter if time precedes every start
/// - [`NO_CHAPTERS_SENTINEL`] for an empty table
///
/// Non-finite times resolve as 0.
///
/// # Examples
/// ```
/// use sravana_ap::playback::chapters::resolve;
/// use sravana_common::Chapter;
///
/// let chapters = vec![
///     Chapter::new(1, "Opening", 0.0, 300.0),
///     Chapter::new(2, "Second", 300.0, 300.0),
/// ];
///
/// assert_eq!(resolve(0.0, &chapters), 1);
/// assert_eq!(resolve(299.9, &chapters), 1);
/// assert_eq!(resolve(300.0, &chapters), 2);
/// assert_eq!(resolve(10_000.0, &chapters), 2);
/// ```
pub fn resolve(time_seconds: f64, chapters: &[Chapter]) -> u32 {
    let Some(first) = chapters.first() else {
        return NO_CHAPTERS_SENTINEL;
    };

    let time = if time_seconds.is_finite() { time_seconds } else { 0.0 };

    // Number of chapters starting at or before `time`
    let started = chapters.partition_point(|c| c.start_time_seconds <= time);
    match started {
        0 => first.number,
        n => chapters[n - 1].number,
    }
}

/// Chapter with number `number`
pub fn chapter_by_number(chapters: &[Chapter], number: u32) -> Option<&Chapter> {
    chapters.iter().find(|c| c.number == number)
}

/// End of chapter `number` (start + duration)
pub fn chapter_end(chapters: &[Chapter], number: u32) -> Option<f64> {
    chapter_by_number(chapters, number).map(Chapter::end_time_seconds)
}

/// Chapter following `number` in playback order
pub fn next_chapter(chapters: &[Chapter], number: u32) -> Option<&Chapter> {
    let index = chapters.iter().position(|c| c.number == number)?;
    chapters.get(index + 1)
}

/// Chapter preceding `number` in playback order
pub fn previous_chapter(chapters: &[Chapter], number: u32) -> Option<&Chapter> {
    let index = chapters.iter().position(|c| c.number == number)?;
    index.checked_sub(1).and_then(|i| chapters.get(i))
}

/// Target of a "previous chapter" command issued at `time_seconds`
///
/// Restarts the current chapter when playback is more than
/// [`PREVIOUS_CHAPTER_RESTART_SECONDS`] into it, otherwise returns the prior
/// chapter (or the first chapter when already there).
pub fn previous_chapter_target(chapters: &[Chapter], time_seconds: f64) -> Option<&Chapter> {
    let current = chapter_by_number(chapters, resolve(time_seconds, chapters))?;
    let into_chapter = time_seconds - current.start_time_seconds;
    if into_chapter > PREVIOUS_CHAPTER_RESTART_SECONDS {
        return Some(current);
    }
    previous_chapter(chapters, current.number).or(Some(current))
}
