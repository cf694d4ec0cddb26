/*!
 * Tests for SRT cleanup before alignment
 */

use subagent::subtitle_processor::fix_srt;

/// Test that the leading advertisement box is dropped and entries renumbered
#[test]
fn test_fix_srt_withAdBox_shouldDropFirstBoxAndRenumber() {
    let input = "1\n00:00:01,000 --> 00:00:02,000\nDownloaded from example.com\n\n2\n00:00:05,000 --> 00:00:06,000\nHello\n\n3\n00:00:08,000 --> 00:00:09,000\nWorld\n";
    let expected = "1\n00:00:05,000 --> 00:00:06,000\nHello\n\n2\n00:00:08,000 --> 00:00:09,000\nWorld\n";
    assert_eq!(fix_srt(input), expected);
}

/// Test that Windows line endings are normalized away
#[test]
fn test_fix_srt_withCrlf_shouldNormalize() {
    let input = "1\r\n00:00:01,000 --> 00:00:02,000\r\nAd\r\n\r\n2\r\n00:00:05,000 --> 00:00:06,000\r\nHello\r\n";
    let fixed = fix_srt(input);
    assert!(!fixed.contains('\r'));
    assert!(fixed.contains("Hello"));
    assert!(!fixed.contains("Ad"));
}

/// Test that a textbox containing two timestamp lines is split back apart
#[test]
fn test_fix_srt_withMergedTextbox_shouldSplitIt() {
    let input = "1\n00:00:01,000 --> 00:00:02,000\nAd\n\n2\n00:00:05,000 --> 00:00:06,000\nHello\n00:00:08,000 --> 00:00:09,000\nWorld\n";
    let expected = "1\n00:00:05,000 --> 00:00:06,000\nHello\n\n2\n00:00:08,000 --> 00:00:09,000\nWorld\n";
    assert_eq!(fix_srt(input), expected);
}

/// Test that renumbering is sequential regardless of original numbers
#[test]
fn test_fix_srt_withGappyNumbering_shouldRenumberSequentially() {
    let input = "7\n00:00:01,000 --> 00:00:02,000\nAd\n\n19\n00:00:05,000 --> 00:00:06,000\nOne\n\n23\n00:00:08,000 --> 00:00:09,000\nTwo\n";
    let fixed = fix_srt(input);
    assert!(fixed.starts_with("1\n00:00:05,000"));
    assert!(fixed.contains("\n\n2\n00:00:08,000"));
}
