/// Generates an event enum with one variant per source plus `Idle` and
/// `Closed`, and a `<Enum>MultiPlexer` holding one unbounded receiver per
/// source. `next` waits for whichever source delivers first; a source whose
/// senders are all gone is skipped from then on.
#[macro_export]
macro_rules! define_event_multiplexer {
    (
        $(#[$enum_attr:meta])*
        pub enum $enum_name:ident {
            $(
                $variant:ident($type:ty) => $field_name:ident
            ),* $(,)?
        }
    ) => {
        $(#[$enum_attr])*
        pub enum $enum_name {
            $(
                $variant($type),
            )*
            /// Nothing arrived within the idle timeout.
            Idle,
            /// Every source is closed.
            Closed,
        }

        $crate::paste::paste! {
            pub struct [<$enum_name MultiPlexer>] {
                $(
                    pub $field_name: tokio::sync::mpsc::UnboundedReceiver<$type>,
                    [<$field_name _closed>]: bool,
                )*
            }

            impl [<$enum_name MultiPlexer>] {
                #[allow(clippy::too_many_arguments)]
                pub fn new(
                    $(
                        $field_name: tokio::sync::mpsc::UnboundedReceiver<$type>,
                    )*
                ) -> Self {
                    Self {
                        $(
                            $field_name,
                            [<$field_name _closed>]: false,
                        )*
                    }
                }

                pub fn is_closed(&self) -> bool {
                    true $(&& self.[<$field_name _closed>])*
                }

                pub async fn next(&mut self, idle_timeout: std::time::Duration) -> $enum_name {
                    loop {
                        if self.is_closed() {
                            return $enum_name::Closed;
                        }
                        tokio::select! {
                            $(
                                event = self.$field_name.recv(), if !self.[<$field_name _closed>] => {
                                    match event {
                                        Some(event) => return $enum_name::$variant(event),
                                        None => {
                                            log::trace!("Source {} closed", stringify!($field_name));
                                            self.[<$field_name _closed>] = true;
                                        }
                                    }
                                }
                            )*
                            _ = tokio::time::sleep(idle_timeout) => {
                                log::trace!("No events within {:?}", idle_timeout);
                                return $enum_name::Idle;
                            }
                        }
                    }
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::sync::mpsc;

    crate::define_event_multiplexer! {
        #[derive(Debug, PartialEq)]
        pub enum TestEvent {
            Number(u32) => numbers,
            Word(String) => words,
        }
    }

    #[tokio::test]
    async fn test_closed_after_all_sources_drop() {
        let (numbers, number_rx) = mpsc::unbounded_channel();
        let (words, word_rx) = mpsc::unbounded_channel();
        let mut mux = TestEventMultiPlexer::new(number_rx, word_rx);

        numbers.send(7).unwrap();
        drop(numbers);
        assert_eq!(mux.next(Duration::from_millis(20)).await, TestEvent::Number(7));

        // one source left open
        assert_eq!(mux.next(Duration::from_millis(20)).await, TestEvent::Idle);
        assert!(!mux.is_closed());

        words.send("hola".to_string()).unwrap();
        drop(words);
        assert_eq!(
            mux.next(Duration::from_millis(20)).await,
            TestEvent::Word("hola".to_string())
        );
        assert_eq!(mux.next(Duration::from_millis(20)).await, TestEvent::Closed);
        assert!(mux.is_closed());
    }
}
