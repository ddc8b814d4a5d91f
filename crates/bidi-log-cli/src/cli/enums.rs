use bidi_log::Category;
use clap::ValueEnum;

/// Which log entries a command subscribes to
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum CategoryArg {
    /// Entries produced by the console API
    #[value(name = "console")]
    Console,

    /// Javascript entries that are not thrown exceptions
    #[value(name = "javascript")]
    Javascript,

    /// Uncaught javascript exceptions (entries carrying a stack trace)
    #[value(name = "exception")]
    Exception,

    /// Every log entry
    #[default]
    #[value(name = "any")]
    Any,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Console => Category::Console,
            CategoryArg::Javascript => Category::JavascriptLog,
            CategoryArg::Exception => Category::JavascriptException,
            CategoryArg::Any => Category::Any,
        }
    }
}
