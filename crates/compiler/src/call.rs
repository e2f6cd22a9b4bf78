use whistle_ir::ValueSource;

/// Builds `projector(args...)`.
///
/// The first argument is inlined as the call's source unless it is itself
/// a projection, in which case it is nested; the rest become additional
/// arguments in order. With no arguments the result is a bare call.
pub fn project(projector: impl Into<String>, args: Vec<ValueSource>) -> ValueSource {
    let mut args = args.into_iter();
    let mut call = ValueSource::call(projector);
    if let Some(first) = args.next() {
        call.source = Some(first.into_source());
        call.additional_arg = args.collect();
    }
    call
}
