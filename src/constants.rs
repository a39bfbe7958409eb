pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const SHOPPING_LIST_HEADER: &str = "список покупок:\n";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";
pub const SHOPPING_LIST_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

// Recipe write validation
pub const COOKING_TIME_ERROR: &str = "cooking time must be positive";
pub const TAG_VALIDATION_ERROR: &str = "tags required";
pub const INGREDIENT_VALIDATE_ERROR: &str = "ingredients required";
pub const INGREDIENT_UNIQUE_ERROR: &str = "ingredients must be unique";
pub const AMOUNT_VALIDATE_ERROR: &str = "amount must be positive";

// Membership toggles
pub const ALREADY_EXISTS_ERROR: &str = "already exists";
pub const NOT_FOUND_ERROR: &str = "not found";
pub const SELF_FOLLOW_ERROR: &str = "cannot follow self";

// Users
pub const INVALID_CREDENTIALS_ERROR: &str = "invalid email or password";
pub const INVALID_PASSWORD_ERROR: &str = "invalid password";
pub const EMAIL_TAKEN_ERROR: &str = "user with this email already exists";
pub const USERNAME_TAKEN_ERROR: &str = "user with this username already exists";
