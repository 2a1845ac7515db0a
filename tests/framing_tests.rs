use robolink::args::{tokenize, MAX_ARGS, MAX_ARG_CHARS};
use robolink::line::{LineRead, LineReader, MAX_LINE_CONTENT};
use robolink::protocol::ProtocolError;
use robolink::MockLink;

fn read(link: &mut MockLink) -> LineRead {
    LineReader::new().read_line(link).unwrap()
}

#[cfg(test)]
mod line_reader_tests {
    use super::*;

    #[test]
    fn test_lf_alone_terminates() {
        let mut link = MockLink::new();
        link.inject(b"E\nR\n");

        assert_eq!(read(&mut link).line().map(|l| l.as_slice()), Some(&b"E"[..]));
        assert_eq!(read(&mut link).line().map(|l| l.as_slice()), Some(&b"R"[..]));
        assert_eq!(read(&mut link), LineRead::Timeout);
    }

    #[test]
    fn test_cap_leaves_rest_for_next_read() {
        let mut link = MockLink::new();
        let mut input = vec![b'1'; MAX_LINE_CONTENT];
        input.extend_from_slice(b"23\r");
        link.inject(&input);

        match read(&mut link) {
            LineRead::Data(line) => assert_eq!(line.len(), MAX_LINE_CONTENT),
            other => panic!("expected data, got {:?}", other),
        }
        match read(&mut link) {
            LineRead::Data(line) => assert_eq!(line.as_slice(), b"23"),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_bytes_after_silence_start_a_new_line() {
        let mut link = MockLink::new();
        link.inject(b"D,10");
        assert!(matches!(read(&mut link), LineRead::ShortRead(_)));

        link.inject(b"0\r");
        assert_eq!(read(&mut link).line().map(|l| l.as_slice()), Some(&b"0"[..]));
    }

    #[test]
    fn test_closed_link_is_an_error() {
        let mut link = MockLink::new();
        link.close();
        assert!(LineReader::new().read_line(&mut link).is_err());
    }
}

#[cfg(test)]
mod tokenizer_tests {
    use super::*;

    fn round_trip(args: &[&str]) {
        let joined = args.join(",");
        let list = tokenize(joined.as_bytes()).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), args, "input {:?}", joined);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        round_trip(&[]);
        round_trip(&["0"]);
        round_trip(&["-400", "400"]);
        round_trip(&["3", "0", "20", "1", "400"]);
        round_trip(&["123456789", "x", "-12345678"]);

        let sixteen: Vec<String> = (0..MAX_ARGS).map(|i| (i * 7).to_string()).collect();
        let sixteen: Vec<&str> = sixteen.iter().map(String::as_str).collect();
        round_trip(&sixteen);
    }

    #[test]
    fn test_tokens_are_cut_to_nine_characters() {
        let list = tokenize(b"1234567890,abcdefghijk").unwrap();
        assert_eq!(list.get(0).map(str::len), Some(MAX_ARG_CHARS));
        assert_eq!(list.get(1), Some("abcdefghi"));
    }

    #[test]
    fn test_overflow_is_reported() {
        let args: Vec<String> = (0..=MAX_ARGS).map(|i| i.to_string()).collect();
        assert_eq!(
            tokenize(args.join(",").as_bytes()),
            Err(ProtocolError::TooManyArguments)
        );
    }

    #[test]
    fn test_separator_runs_do_not_count_toward_the_limit() {
        let section = format!("{},,,,", vec!["1"; MAX_ARGS].join(",,"));
        assert_eq!(tokenize(section.as_bytes()).unwrap().len(), MAX_ARGS);
    }
}
