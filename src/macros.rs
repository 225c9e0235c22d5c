/// Builds a [`Context`](crate::Context) from `key => value` pairs.
///
/// Keys convert into `String` and values into [`serde_json::Value`]. Later
/// keys overwrite earlier ones, just like [`Context::insert`].
///
/// [`Context::insert`]: crate::Context::insert
///
/// # Examples
///
/// ```
/// use honeybadger::context;
///
/// let ctx = context! {
///     "user_id" => 42,
///     "plan" => "enterprise",
///     "beta" => true,
/// };
/// assert_eq!(ctx.len(), 3);
///
/// let empty = context! {};
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! context {
    () => {
        $crate::Context::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut context = $crate::Context::new();
        $(
            context.insert($key, $value);
        )+
        context
    }};
}
